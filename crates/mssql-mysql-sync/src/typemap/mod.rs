//! Type mapping between SQL Server and MySQL.

use std::fmt;

use tracing::warn;

use crate::core::schema::SourceColumn;
use crate::error::{Result, SyncError};

/// SQL Server types the sync knows how to map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceType {
    BigInt,
    Int,
    SmallInt,
    TinyInt,
    Float,
    Real,
    Decimal,
    Numeric,
    VarChar,
    NVarChar,
    Char,
    NChar,
    Binary,
    VarBinary,
    Image,
    Bit,
    Date,
    DateTime2,
    DateTime,
    SmallDateTime,
    Time,
    DateTimeOffset,
    Money,
    SmallMoney,
    Text,
    NText,
    Xml,
    UniqueIdentifier,
}

impl SourceType {
    /// Parse a catalog type name (case-insensitive).
    pub fn parse(name: &str) -> Option<Self> {
        let parsed = match name.trim().to_lowercase().as_str() {
            "bigint" => SourceType::BigInt,
            "int" => SourceType::Int,
            "smallint" => SourceType::SmallInt,
            "tinyint" => SourceType::TinyInt,
            "float" => SourceType::Float,
            "real" => SourceType::Real,
            "decimal" => SourceType::Decimal,
            "numeric" => SourceType::Numeric,
            "varchar" => SourceType::VarChar,
            "nvarchar" => SourceType::NVarChar,
            "char" => SourceType::Char,
            "nchar" => SourceType::NChar,
            "binary" => SourceType::Binary,
            "varbinary" => SourceType::VarBinary,
            "image" => SourceType::Image,
            "bit" => SourceType::Bit,
            "date" => SourceType::Date,
            "datetime2" => SourceType::DateTime2,
            "datetime" => SourceType::DateTime,
            "smalldatetime" => SourceType::SmallDateTime,
            "time" => SourceType::Time,
            "datetimeoffset" => SourceType::DateTimeOffset,
            "money" => SourceType::Money,
            "smallmoney" => SourceType::SmallMoney,
            "text" => SourceType::Text,
            "ntext" => SourceType::NText,
            "xml" => SourceType::Xml,
            "uniqueidentifier" => SourceType::UniqueIdentifier,
            _ => return None,
        };
        Some(parsed)
    }

    /// Catalog name of the type.
    pub fn name(&self) -> &'static str {
        match self {
            SourceType::BigInt => "bigint",
            SourceType::Int => "int",
            SourceType::SmallInt => "smallint",
            SourceType::TinyInt => "tinyint",
            SourceType::Float => "float",
            SourceType::Real => "real",
            SourceType::Decimal => "decimal",
            SourceType::Numeric => "numeric",
            SourceType::VarChar => "varchar",
            SourceType::NVarChar => "nvarchar",
            SourceType::Char => "char",
            SourceType::NChar => "nchar",
            SourceType::Binary => "binary",
            SourceType::VarBinary => "varbinary",
            SourceType::Image => "image",
            SourceType::Bit => "bit",
            SourceType::Date => "date",
            SourceType::DateTime2 => "datetime2",
            SourceType::DateTime => "datetime",
            SourceType::SmallDateTime => "smalldatetime",
            SourceType::Time => "time",
            SourceType::DateTimeOffset => "datetimeoffset",
            SourceType::Money => "money",
            SourceType::SmallMoney => "smallmoney",
            SourceType::Text => "text",
            SourceType::NText => "ntext",
            SourceType::Xml => "xml",
            SourceType::UniqueIdentifier => "uniqueidentifier",
        }
    }

    /// Whether values of this type can serve as a row identifier.
    pub fn is_valid_id(&self) -> bool {
        matches!(
            self,
            SourceType::BigInt
                | SourceType::Int
                | SourceType::SmallInt
                | SourceType::TinyInt
                | SourceType::Decimal
                | SourceType::Numeric
                | SourceType::VarChar
                | SourceType::NVarChar
                | SourceType::Char
                | SourceType::NChar
                | SourceType::UniqueIdentifier
        )
    }

    /// Whether the source pads values with trailing spaces.
    pub fn is_fixed_length_text(&self) -> bool {
        matches!(self, SourceType::Char | SourceType::NChar)
    }
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// MySQL column types produced by the mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MysqlType {
    BigInt,
    Int,
    SmallInt,
    /// `TINYINT UNSIGNED`, matching the source's 0..255 range.
    TinyIntUnsigned,
    Double,
    Float,
    Decimal { precision: u8, scale: u8 },
    VarChar(u32),
    Char(u32),
    Text,
    LongText,
    LongBlob,
    /// `TINYINT(1)`
    Boolean,
    Date,
    /// `DATETIME`, whole seconds.
    DateTime,
    /// `DATETIME(6)`
    DateTimeMicros,
    /// `TIME(6)`
    TimeMicros,
}

impl MysqlType {
    /// Non-comparable columns are written on insert but never trigger updates.
    pub fn is_comparable(&self) -> bool {
        !matches!(self, MysqlType::TimeMicros | MysqlType::LongBlob)
    }

    /// Whether the target stores fractional seconds.
    pub fn keeps_microseconds(&self) -> bool {
        matches!(self, MysqlType::DateTimeMicros | MysqlType::TimeMicros)
    }
}

impl fmt::Display for MysqlType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MysqlType::BigInt => f.write_str("BIGINT"),
            MysqlType::Int => f.write_str("INT"),
            MysqlType::SmallInt => f.write_str("SMALLINT"),
            MysqlType::TinyIntUnsigned => f.write_str("TINYINT UNSIGNED"),
            MysqlType::Double => f.write_str("DOUBLE"),
            MysqlType::Float => f.write_str("FLOAT"),
            MysqlType::Decimal { precision, scale } => {
                write!(f, "DECIMAL({},{})", precision, scale)
            }
            MysqlType::VarChar(n) => write!(f, "VARCHAR({})", n),
            MysqlType::Char(n) => write!(f, "CHAR({})", n),
            MysqlType::Text => f.write_str("TEXT"),
            MysqlType::LongText => f.write_str("LONGTEXT"),
            MysqlType::LongBlob => f.write_str("LONGBLOB"),
            MysqlType::Boolean => f.write_str("TINYINT(1)"),
            MysqlType::Date => f.write_str("DATE"),
            MysqlType::DateTime => f.write_str("DATETIME"),
            MysqlType::DateTimeMicros => f.write_str("DATETIME(6)"),
            MysqlType::TimeMicros => f.write_str("TIME(6)"),
        }
    }
}

/// Target column definition derived from a source column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetColumnDefinition {
    /// Target type.
    pub sql_type: MysqlType,

    /// Whether the source column allows NULL.
    pub is_nullable: bool,

    /// Whether the column becomes the table's primary key.
    pub is_primary_key: bool,

    /// Whether the column carries AUTO_INCREMENT.
    pub is_auto_increment: bool,

    /// Source identity seed, applied with `ALTER TABLE ... AUTO_INCREMENT`.
    pub auto_increment_seed: Option<i64>,

    /// Source identity increment. The target always steps by 1.
    pub auto_increment_step: Option<i64>,
}

impl TargetColumnDefinition {
    fn plain(sql_type: MysqlType, is_nullable: bool) -> Self {
        Self {
            sql_type,
            is_nullable,
            is_primary_key: false,
            is_auto_increment: false,
            auto_increment_seed: None,
            auto_increment_step: None,
        }
    }

    /// Whether the column takes part in update detection.
    pub fn is_comparable(&self) -> bool {
        self.sql_type.is_comparable()
    }

    /// Column definition text for `CREATE TABLE`.
    pub fn render(&self) -> String {
        if self.is_auto_increment {
            format!("{} AUTO_INCREMENT", self.sql_type)
        } else {
            self.sql_type.to_string()
        }
    }

    /// Column definition text for `ALTER TABLE ... ADD COLUMN`.
    ///
    /// AUTO_INCREMENT is only accepted on a key column, so it is never added
    /// to an existing table.
    pub fn render_additive(&self) -> String {
        self.sql_type.to_string()
    }

    /// Drop identity semantics, keeping the type.
    fn demote(&mut self) {
        self.is_primary_key = false;
        self.is_auto_increment = false;
        self.auto_increment_seed = None;
        self.auto_increment_step = None;
    }
}

/// Map one source column to its MySQL definition.
///
/// Identity columns seeded at 1 become an AUTO_INCREMENT primary key; any
/// other identity column maps as an ordinary column.
///
/// # Errors
///
/// Returns `SyncError::UnsupportedType` for type names outside [`SourceType`].
pub fn map_column(table: &str, column: &SourceColumn) -> Result<TargetColumnDefinition> {
    let source_type =
        SourceType::parse(&column.data_type).ok_or_else(|| SyncError::UnsupportedType {
            table: table.to_string(),
            column: column.name.clone(),
            type_name: column.data_type.clone(),
        })?;

    let mut def = TargetColumnDefinition::plain(
        map_type(source_type, column.max_length, column.precision, column.scale),
        column.is_nullable,
    );

    if column.is_identity && column.identity_seed == Some(1) {
        def.is_primary_key = true;
        def.is_auto_increment = true;
        def.is_nullable = false;
        def.auto_increment_seed = column.identity_seed;
        def.auto_increment_step = column.identity_increment;
    }

    Ok(def)
}

/// Map every column of a table, keeping at most one AUTO_INCREMENT column.
///
/// The first candidate wins; later ones are demoted with a warning.
pub fn map_table<'a, I>(table: &str, columns: I) -> Result<Vec<TargetColumnDefinition>>
where
    I: IntoIterator<Item = &'a SourceColumn>,
{
    let mut seen_auto_increment: Option<&str> = None;
    let mut defs = Vec::new();

    for column in columns {
        let mut def = map_column(table, column)?;
        if def.is_auto_increment {
            match seen_auto_increment {
                Some(winner) => {
                    warn!(
                        "{}: column {} is also an identity column; only {} keeps AUTO_INCREMENT",
                        table, column.name, winner
                    );
                    def.demote();
                }
                None => seen_auto_increment = Some(column.name.as_str()),
            }
        }
        defs.push(def);
    }

    Ok(defs)
}

/// Map a parsed source type with its length/precision to a MySQL type.
pub fn map_type(
    source_type: SourceType,
    max_length: Option<i32>,
    precision: Option<i32>,
    scale: Option<i32>,
) -> MysqlType {
    match source_type {
        SourceType::BigInt => MysqlType::BigInt,
        SourceType::Int => MysqlType::Int,
        SourceType::SmallInt => MysqlType::SmallInt,
        SourceType::TinyInt => MysqlType::TinyIntUnsigned,
        SourceType::Float => MysqlType::Double,
        SourceType::Real => MysqlType::Float,

        SourceType::Decimal | SourceType::Numeric => {
            let precision = precision.filter(|p| (1..=65).contains(p)).unwrap_or(18);
            let scale = scale.filter(|s| *s >= 0 && *s <= precision.min(30)).unwrap_or(0);
            MysqlType::Decimal {
                precision: precision as u8,
                scale: scale as u8,
            }
        }
        SourceType::Money => MysqlType::Decimal {
            precision: 19,
            scale: 4,
        },
        SourceType::SmallMoney => MysqlType::Decimal {
            precision: 10,
            scale: 4,
        },

        SourceType::VarChar | SourceType::NVarChar => match max_length {
            Some(n) if n > 0 => MysqlType::VarChar(n as u32),
            _ => MysqlType::Text,
        },
        // MySQL CHAR stops at 255 characters.
        SourceType::Char | SourceType::NChar => match max_length {
            Some(n) if n > 255 => MysqlType::VarChar(n as u32),
            Some(n) if n > 0 => MysqlType::Char(n as u32),
            _ => MysqlType::Char(1),
        },
        SourceType::Text | SourceType::NText => MysqlType::LongText,
        SourceType::Xml => MysqlType::Text,
        SourceType::UniqueIdentifier => MysqlType::Char(36),

        SourceType::Binary | SourceType::VarBinary | SourceType::Image => MysqlType::LongBlob,

        SourceType::Bit => MysqlType::Boolean,

        SourceType::Date => MysqlType::Date,
        SourceType::DateTime2 => MysqlType::DateTimeMicros,
        SourceType::DateTime | SourceType::SmallDateTime => MysqlType::DateTime,
        SourceType::Time => MysqlType::TimeMicros,
        SourceType::DateTimeOffset => MysqlType::VarChar(40),
    }
}
