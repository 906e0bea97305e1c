use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display};

/// One of the five categorical feature groups shared by projects and talents.
///
/// The declaration order is the order of the model input slots, so do not
/// reorder variants without retraining.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, AsRefStr, Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Facet {
    Platform,
    Product,
    Role,
    Language,
    Tools,
}

impl Facet {
    pub const ALL: [Facet; 5] = [
        Facet::Platform,
        Facet::Product,
        Facet::Role,
        Facet::Language,
        Facet::Tools,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Facet::Platform => "platform",
            Facet::Product => "product",
            Facet::Role => "role",
            Facet::Language => "language",
            Facet::Tools => "tools",
        }
    }

    /// Relational table holding the `(id, name)` vocabulary of this facet.
    pub fn table_name(&self) -> &'static str {
        match self {
            Facet::Platform => "platform",
            Facet::Product => "product_type",
            Facet::Role => "role",
            Facet::Language => "language",
            Facet::Tools => "tools",
        }
    }

    /// Slot position inside one side (project or talent) of the model input.
    pub fn slot(&self) -> usize {
        *self as usize
    }
}
