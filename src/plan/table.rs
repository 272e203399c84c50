//! Allow-listed content tables and their column schemas

use chrono::{DateTime, NaiveDate};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::PlanError;

/// Columns every content table carries that plans may never write
pub const SYSTEM_COLUMNS: [&str; 3] = ["id", "created_at", "updated_at"];

/// Kind of value a column holds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Text,
    Integer,
    Real,
    Bool,
    /// Arbitrary JSON (tags, link lists, ...)
    Json,
    /// RFC 3339 timestamp or `YYYY-MM-DD` date, stored as text
    Date,
}

impl ColumnKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ColumnKind::Text => "text",
            ColumnKind::Integer => "integer",
            ColumnKind::Real => "number",
            ColumnKind::Bool => "boolean",
            ColumnKind::Json => "json",
            ColumnKind::Date => "date",
        }
    }

    pub fn sql_type(&self) -> &'static str {
        match self {
            ColumnKind::Integer | ColumnKind::Bool => "INTEGER",
            ColumnKind::Real => "REAL",
            ColumnKind::Text | ColumnKind::Json | ColumnKind::Date => "TEXT",
        }
    }

    /// Whether a non-null JSON value fits this column
    pub fn accepts(&self, value: &Value) -> bool {
        match self {
            ColumnKind::Text => value.is_string(),
            ColumnKind::Integer => value.as_i64().is_some(),
            ColumnKind::Real => value.is_number(),
            ColumnKind::Bool => value.is_boolean(),
            ColumnKind::Json => true,
            ColumnKind::Date => value.as_str().map(is_date).unwrap_or(false),
        }
    }

    /// Convert a text input into a value of this kind.
    ///
    /// An empty input clears non-text columns to null.
    pub fn coerce(&self, raw: &str) -> Option<Value> {
        let trimmed = raw.trim();
        if trimmed.is_empty() && *self != ColumnKind::Text {
            return Some(Value::Null);
        }
        match self {
            ColumnKind::Text => Some(Value::String(raw.to_string())),
            ColumnKind::Integer => trimmed.parse::<i64>().ok().map(Value::from),
            ColumnKind::Real => trimmed
                .parse::<f64>()
                .ok()
                .and_then(serde_json::Number::from_f64)
                .map(Value::Number),
            ColumnKind::Bool => match trimmed.to_lowercase().as_str() {
                "true" | "yes" | "1" => Some(Value::Bool(true)),
                "false" | "no" | "0" => Some(Value::Bool(false)),
                _ => None,
            },
            ColumnKind::Json => {
                Some(serde_json::from_str(trimmed).unwrap_or_else(|_| Value::String(raw.to_string())))
            }
            ColumnKind::Date => is_date(trimmed).then(|| Value::String(trimmed.to_string())),
        }
    }
}

fn is_date(s: &str) -> bool {
    DateTime::parse_from_rfc3339(s).is_ok() || NaiveDate::parse_from_str(s, "%Y-%m-%d").is_ok()
}

/// Name of the JSON type of a value, for error messages
pub fn json_type_name(value: &Value) -> String {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_f64() => "number",
        Value::Number(_) => "integer",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
    .to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Column {
    pub name: &'static str,
    pub kind: ColumnKind,
    pub required: bool,
}

const fn col(name: &'static str, kind: ColumnKind) -> Column {
    Column { name, kind, required: false }
}

const fn req(name: &'static str, kind: ColumnKind) -> Column {
    Column { name, kind, required: true }
}

use ColumnKind::{Bool, Date, Integer, Json, Real, Text};

const PROJECTS: &[Column] = &[
    req("title", Text),
    col("slug", Text),
    col("description", Text),
    col("content", Text),
    col("image_url", Text),
    col("link", Text),
    col("tags", Json),
    col("status", Text),
    col("featured", Bool),
    col("sort_order", Integer),
];

const ARTICLES: &[Column] = &[
    req("title", Text),
    col("slug", Text),
    col("excerpt", Text),
    col("content", Text),
    col("cover_image", Text),
    col("tags", Json),
    col("published", Bool),
    col("published_at", Date),
];

const UPDATES: &[Column] = &[
    req("title", Text),
    col("content", Text),
    col("published", Bool),
    col("published_at", Date),
];

const EXPERIMENTS: &[Column] = &[
    req("title", Text),
    col("description", Text),
    col("content", Text),
    col("demo_url", Text),
    col("image_url", Text),
    col("status", Text),
    col("tags", Json),
];

const PRODUCTS: &[Column] = &[
    req("name", Text),
    col("description", Text),
    col("price", Real),
    col("currency", Text),
    col("image_url", Text),
    col("purchase_url", Text),
    col("in_stock", Bool),
];

const PRODUCT_REVIEWS: &[Column] = &[
    req("product_id", Text),
    col("reviewer_name", Text),
    col("rating", Integer),
    col("content", Text),
];

const ARTWORK: &[Column] = &[
    req("title", Text),
    col("description", Text),
    col("image_url", Text),
    col("medium", Text),
    col("year", Integer),
    col("for_sale", Bool),
    col("price", Real),
];

const FAVORITES: &[Column] = &[
    req("title", Text),
    col("category", Text),
    col("url", Text),
    col("description", Text),
    col("image_url", Text),
];

const INSPIRATIONS: &[Column] = &[
    req("title", Text),
    col("description", Text),
    col("source_url", Text),
    col("image_url", Text),
    col("category", Text),
];

const EXPERIENCES: &[Column] = &[
    req("title", Text),
    col("company", Text),
    col("location", Text),
    col("description", Text),
    col("start_date", Date),
    col("end_date", Date),
    col("current", Bool),
];

const LIFE_PERIODS: &[Column] = &[
    req("title", Text),
    col("description", Text),
    col("location", Text),
    col("start_date", Date),
    col("end_date", Date),
];

const CERTIFICATIONS: &[Column] = &[
    req("name", Text),
    col("issuer", Text),
    col("issued_at", Date),
    col("expires_at", Date),
    col("credential_url", Text),
];

const CLIENT_PROJECTS: &[Column] = &[
    req("name", Text),
    col("client_name", Text),
    col("description", Text),
    col("status", Text),
    col("budget", Real),
    col("start_date", Date),
    col("end_date", Date),
];

const SKILLS: &[Column] = &[
    req("name", Text),
    col("category", Text),
    col("proficiency", Integer),
    col("years", Real),
];

const LEARNING_GOALS: &[Column] = &[
    req("title", Text),
    col("description", Text),
    col("status", Text),
    col("progress", Integer),
    col("target_date", Date),
];

const FUNDING_CAMPAIGNS: &[Column] = &[
    req("title", Text),
    col("description", Text),
    col("goal_amount", Real),
    col("raised_amount", Real),
    col("status", Text),
    col("ends_at", Date),
];

const SUPPLIES_NEEDED: &[Column] = &[
    req("name", Text),
    col("description", Text),
    col("quantity", Integer),
    col("priority", Text),
    col("estimated_cost", Real),
    col("acquired", Bool),
];

const SALES_DATA: &[Column] = &[
    col("product_id", Text),
    col("channel", Text),
    req("amount", Real),
    col("quantity", Integer),
    col("sold_at", Date),
];

const LEADS: &[Column] = &[
    req("name", Text),
    col("email", Text),
    col("company", Text),
    col("message", Text),
    col("status", Text),
    col("source", Text),
];

/// A table that AI-generated plans are allowed to target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentTable {
    Projects,
    Articles,
    Updates,
    Experiments,
    Products,
    ProductReviews,
    Artwork,
    Favorites,
    Inspirations,
    Experiences,
    LifePeriods,
    Certifications,
    ClientProjects,
    Skills,
    LearningGoals,
    FundingCampaigns,
    SuppliesNeeded,
    SalesData,
    Leads,
}

impl ContentTable {
    pub const ALL: [ContentTable; 19] = [
        ContentTable::Projects,
        ContentTable::Articles,
        ContentTable::Updates,
        ContentTable::Experiments,
        ContentTable::Products,
        ContentTable::ProductReviews,
        ContentTable::Artwork,
        ContentTable::Favorites,
        ContentTable::Inspirations,
        ContentTable::Experiences,
        ContentTable::LifePeriods,
        ContentTable::Certifications,
        ContentTable::ClientProjects,
        ContentTable::Skills,
        ContentTable::LearningGoals,
        ContentTable::FundingCampaigns,
        ContentTable::SuppliesNeeded,
        ContentTable::SalesData,
        ContentTable::Leads,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ContentTable::Projects => "projects",
            ContentTable::Articles => "articles",
            ContentTable::Updates => "updates",
            ContentTable::Experiments => "experiments",
            ContentTable::Products => "products",
            ContentTable::ProductReviews => "product_reviews",
            ContentTable::Artwork => "artwork",
            ContentTable::Favorites => "favorites",
            ContentTable::Inspirations => "inspirations",
            ContentTable::Experiences => "experiences",
            ContentTable::LifePeriods => "life_periods",
            ContentTable::Certifications => "certifications",
            ContentTable::ClientProjects => "client_projects",
            ContentTable::Skills => "skills",
            ContentTable::LearningGoals => "learning_goals",
            ContentTable::FundingCampaigns => "funding_campaigns",
            ContentTable::SuppliesNeeded => "supplies_needed",
            ContentTable::SalesData => "sales_data",
            ContentTable::Leads => "leads",
        }
    }

    /// Resolve a table name, rejecting anything outside the allow-list
    pub fn from_str(s: &str) -> Result<Self, PlanError> {
        let name = s.trim();
        Self::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == name)
            .ok_or_else(|| PlanError::UnknownTable(name.to_string()))
    }

    pub fn columns(&self) -> &'static [Column] {
        match self {
            ContentTable::Projects => PROJECTS,
            ContentTable::Articles => ARTICLES,
            ContentTable::Updates => UPDATES,
            ContentTable::Experiments => EXPERIMENTS,
            ContentTable::Products => PRODUCTS,
            ContentTable::ProductReviews => PRODUCT_REVIEWS,
            ContentTable::Artwork => ARTWORK,
            ContentTable::Favorites => FAVORITES,
            ContentTable::Inspirations => INSPIRATIONS,
            ContentTable::Experiences => EXPERIENCES,
            ContentTable::LifePeriods => LIFE_PERIODS,
            ContentTable::Certifications => CERTIFICATIONS,
            ContentTable::ClientProjects => CLIENT_PROJECTS,
            ContentTable::Skills => SKILLS,
            ContentTable::LearningGoals => LEARNING_GOALS,
            ContentTable::FundingCampaigns => FUNDING_CAMPAIGNS,
            ContentTable::SuppliesNeeded => SUPPLIES_NEEDED,
            ContentTable::SalesData => SALES_DATA,
            ContentTable::Leads => LEADS,
        }
    }

    pub fn column(&self, name: &str) -> Option<&'static Column> {
        self.columns().iter().find(|c| c.name == name)
    }

    /// Column used to label a row in listings (first text column)
    pub fn label_column(&self) -> &'static str {
        self.columns()
            .iter()
            .find(|c| c.kind == ColumnKind::Text)
            .map(|c| c.name)
            .unwrap_or("id")
    }

    /// Path of the admin editor screen for this table
    pub fn editor_route(&self) -> String {
        format!("/admin/{}", self.as_str().replace('_', "-"))
    }

    /// Check column names and value kinds of a payload.
    ///
    /// With `require_all`, every required column must be present and non-null.
    pub fn validate_fields(&self, fields: &Map<String, Value>, require_all: bool) -> Result<(), PlanError> {
        for (name, value) in fields {
            let column = self.column(name).ok_or_else(|| PlanError::UnknownColumn {
                table: self.as_str().to_string(),
                column: name.clone(),
            })?;

            if value.is_null() {
                if column.required {
                    return Err(PlanError::MissingColumn {
                        table: self.as_str().to_string(),
                        column: name.clone(),
                    });
                }
                continue;
            }

            if !column.kind.accepts(value) {
                return Err(PlanError::TypeMismatch {
                    table: self.as_str().to_string(),
                    column: name.clone(),
                    expected: column.kind.as_str(),
                    got: json_type_name(value),
                });
            }
        }

        if require_all {
            for column in self.columns().iter().filter(|c| c.required) {
                if fields.get(column.name).map_or(true, Value::is_null) {
                    return Err(PlanError::MissingColumn {
                        table: self.as_str().to_string(),
                        column: column.name.to_string(),
                    });
                }
            }
        }

        Ok(())
    }

    /// Whether a column may be used in filters and ordering
    pub fn is_queryable(&self, name: &str) -> bool {
        SYSTEM_COLUMNS.contains(&name) || self.column(name).is_some()
    }
}

impl std::fmt::Display for ContentTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
