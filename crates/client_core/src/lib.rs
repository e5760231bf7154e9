use std::sync::Arc;

use reqwest::Client;
use shared::{domain::Meal, protocol::NewMeal};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::error;

/// The single failure kind for both collection operations. Connection
/// errors, non-2xx statuses and undecodable payloads are not told apart;
/// none of them is retried or surfaced beyond the log.
#[derive(Debug, Error)]
#[error("request failed: {0}")]
pub struct RequestFailed(Box<dyn std::error::Error + Send + Sync>);

impl From<reqwest::Error> for RequestFailed {
    fn from(err: reqwest::Error) -> Self {
        Self(err.into())
    }
}

impl From<serde_json::Error> for RequestFailed {
    fn from(err: serde_json::Error) -> Self {
        Self(err.into())
    }
}

/// In-progress form entry. Calories stay text until submission; coercion
/// happens in [`MealListClient::add_meal`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DraftMeal {
    pub name: String,
    pub calories: String,
}

#[derive(Debug, Clone, Default)]
pub struct MealListState {
    /// Most recent successful fetch result, replaced wholesale. Empty
    /// until a fetch has succeeded.
    pub meals: Vec<Meal>,
    pub draft: DraftMeal,
}

/// Client for the meal collection endpoint. Holds the list and the draft
/// behind one lock; operations interleave on the runtime, and when fetches
/// race, whichever response is applied last wins. No cancellation, no
/// request timeout.
pub struct MealListClient {
    http: Client,
    server_url: String,
    inner: Mutex<MealListState>,
}

impl MealListClient {
    /// Builds a client and eagerly loads the list once. A failed initial
    /// load is logged and leaves the list empty.
    pub async fn connect(server_url: impl Into<String>) -> Arc<Self> {
        let client = Arc::new(Self {
            http: Client::new(),
            server_url: server_url.into(),
            inner: Mutex::new(MealListState::default()),
        });
        client.load_meals().await;
        client
    }

    pub async fn meals(&self) -> Vec<Meal> {
        self.inner.lock().await.meals.clone()
    }

    pub async fn draft(&self) -> DraftMeal {
        self.inner.lock().await.draft.clone()
    }

    pub async fn set_draft(&self, name: impl Into<String>, calories: impl Into<String>) {
        self.inner.lock().await.draft = DraftMeal {
            name: name.into(),
            calories: calories.into(),
        };
    }

    /// Replaces the list with the server's current collection. On failure
    /// the list keeps its previous value and the error is only logged.
    pub async fn load_meals(&self) {
        match self.fetch_meals().await {
            Ok(meals) => self.inner.lock().await.meals = meals,
            Err(err) => error!("failed to load meals: {err}"),
        }
    }

    /// Submits the draft. Calories are coerced to a base-10 integer first;
    /// text without a leading digit run is transmitted as the null
    /// sentinel. On success the draft is cleared and the list re-fetched
    /// once; on failure the draft keeps its previous value and the error
    /// is only logged.
    pub async fn add_meal(&self) {
        let draft = self.inner.lock().await.draft.clone();
        let payload = NewMeal {
            name: draft.name,
            calories: coerce_calories(&draft.calories),
        };

        match self.create_meal(&payload).await {
            Ok(()) => {
                self.inner.lock().await.draft = DraftMeal::default();
                self.load_meals().await;
            }
            Err(err) => error!("failed to add meal: {err}"),
        }
    }

    async fn fetch_meals(&self) -> Result<Vec<Meal>, RequestFailed> {
        let body = self
            .http
            .get(format!("{}/api/meals", self.server_url))
            .send()
            .await?
            .error_for_status()?
            .bytes()
            .await?;

        // An absent body and a JSON `null` both mean an empty collection.
        if body.is_empty() {
            return Ok(Vec::new());
        }
        let meals: Option<Vec<Meal>> = serde_json::from_slice(&body)?;
        Ok(meals.unwrap_or_default())
    }

    async fn create_meal(&self, payload: &NewMeal) -> Result<(), RequestFailed> {
        self.http
            .post(format!("{}/api/meals", self.server_url))
            .json(payload)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

/// Base-10 coercion of form text: leading ASCII whitespace is skipped, an
/// optional sign is honored, and the longest digit prefix wins ("150.7" is
/// 150, "12abc" is 12). No digits at all yields `None`, the not-a-number
/// sentinel that is transmitted as-is.
pub fn coerce_calories(input: &str) -> Option<i64> {
    let trimmed = input.trim_start();
    let (negative, rest) = match trimmed.strip_prefix(['+', '-']) {
        Some(rest) => (trimmed.starts_with('-'), rest),
        None => (false, trimmed),
    };

    let end = rest
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(rest.len());
    let value: i64 = rest[..end].parse().ok()?;
    Some(if negative { -value } else { value })
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
