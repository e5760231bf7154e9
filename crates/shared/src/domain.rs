use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub struct $name(pub i64);
    };
}

id_newtype!(MealId);

/// A meal as stored by the server. Ids and timestamps are assigned on
/// insert; clients treat fetched records as read-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Meal {
    pub id: MealId,
    pub name: String,
    pub calories: i64,
    pub created_at: DateTime<Utc>,
}
