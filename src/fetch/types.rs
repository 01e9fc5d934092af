//! Denormalized business aggregate

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A business row joined with its stats and recent reviews
///
/// Serializes flat: the business columns sit next to `stats` and `reviews`,
/// the way API responses have always exposed them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BusinessAggregate {
    #[serde(flatten)]
    pub business: Map<String, Value>,

    /// `business_stats` row, `None` when missing or when its query failed
    #[serde(default)]
    pub stats: Option<Value>,

    /// Newest first
    #[serde(default)]
    pub reviews: Vec<ReviewWithRelations>,
}

impl BusinessAggregate {
    /// Aggregate with no related data yet
    ///
    /// Columns named `stats` or `reviews` are replaced by the joined fields.
    pub fn from_row(mut business: Map<String, Value>) -> Self {
        business.remove("stats");
        business.remove("reviews");
        Self {
            business,
            stats: None,
            reviews: Vec::new(),
        }
    }

    pub fn id(&self) -> Option<&Value> {
        self.business.get("id")
    }
}

/// A review with its author profile and attached images
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewWithRelations {
    #[serde(flatten)]
    pub review: Map<String, Value>,

    /// `profiles` row whose `user_id` matches the review's
    #[serde(default)]
    pub profile: Option<Value>,

    /// `review_images` rows for this review, empty when none or on failure
    #[serde(default)]
    pub images: Vec<Value>,
}

impl ReviewWithRelations {
    pub fn from_row(mut review: Map<String, Value>) -> Self {
        review.remove("profile");
        review.remove("images");
        Self {
            review,
            profile: None,
            images: Vec::new(),
        }
    }

    pub fn id(&self) -> Option<&Value> {
        self.review.get("id")
    }

    pub fn user_id(&self) -> Option<&Value> {
        self.review.get("user_id")
    }
}
