use serde::{Deserialize, Deserializer, Serialize};

/// Fixed column type vocabulary offered by database nodes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    Uuid,
    #[default]
    Text,
    Varchar,
    Int,
    Bigint,
    Boolean,
    Timestamp,
    Jsonb,
    Float,
    Date,
}

impl ColumnType {
    pub fn as_str(self) -> &'static str {
        match self {
            ColumnType::Uuid => "uuid",
            ColumnType::Text => "text",
            ColumnType::Varchar => "varchar",
            ColumnType::Int => "int",
            ColumnType::Bigint => "bigint",
            ColumnType::Boolean => "boolean",
            ColumnType::Timestamp => "timestamp",
            ColumnType::Jsonb => "jsonb",
            ColumnType::Float => "float",
            ColumnType::Date => "date",
        }
    }

    /// Parses a type name; anything outside the vocabulary becomes `text`.
    pub fn parse_lenient(value: &str) -> Self {
        match value.trim().to_lowercase().as_str() {
            "uuid" => ColumnType::Uuid,
            "varchar" => ColumnType::Varchar,
            "int" => ColumnType::Int,
            "bigint" => ColumnType::Bigint,
            "boolean" => ColumnType::Boolean,
            "timestamp" => ColumnType::Timestamp,
            "jsonb" => ColumnType::Jsonb,
            "float" => ColumnType::Float,
            "date" => ColumnType::Date,
            _ => ColumnType::Text,
        }
    }
}

impl<'de> Deserialize<'de> for ColumnType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(ColumnType::parse_lenient(&raw))
    }
}

/// Pointer from a foreign-key column to `"TableName.columnName"`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnReference {
    pub table: String,
    pub column: String,
}

impl ColumnReference {
    pub fn parse(value: &str) -> Option<Self> {
        let (table, column) = value.split_once('.')?;
        if table.is_empty() || column.is_empty() {
            return None;
        }
        Some(Self {
            table: table.to_string(),
            column: column.to_string(),
        })
    }
}

impl std::fmt::Display for ColumnReference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.table, self.column)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Column {
    pub name: String,
    #[serde(rename = "type", default)]
    pub column_type: ColumnType,
    #[serde(default)]
    pub is_primary: bool,
    #[serde(default, alias = "isForeign")]
    pub is_foreign_key: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub references: Option<String>,
}

impl Column {
    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            column_type,
            is_primary: false,
            is_foreign_key: false,
            references: None,
        }
    }

    pub fn primary(mut self) -> Self {
        self.is_primary = true;
        self.is_foreign_key = false;
        self
    }

    pub fn foreign(mut self, references: impl Into<String>) -> Self {
        self.is_primary = false;
        self.is_foreign_key = true;
        self.references = Some(references.into());
        self
    }

    pub fn reference(&self) -> Option<ColumnReference> {
        self.references.as_deref().and_then(ColumnReference::parse)
    }

    /// Steps the key marker: none -> primary -> foreign -> none.
    pub fn cycle_key(&mut self) {
        if !self.is_primary && !self.is_foreign_key {
            self.is_primary = true;
        } else if self.is_primary {
            self.is_primary = false;
            self.is_foreign_key = true;
        } else {
            self.is_foreign_key = false;
            self.references = None;
        }
    }
}
