//! services/api/src/adapters/badges.rs
//!
//! Client for the external badge rules service, implementing the `BadgeEvaluator` port.
//! The service owns all badge rules; this adapter only asks it to evaluate a user.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reading_tracker_core::domain::Award;
use reading_tracker_core::ports::{BadgeEvaluator, PortError, PortResult};
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;
use uuid::Uuid;

#[derive(Debug, Deserialize)]
struct EvaluationResponse {
    #[serde(default)]
    awards: Vec<AwardPayload>,
}

#[derive(Debug, Deserialize)]
struct AwardPayload {
    id: Uuid,
    name: String,
    awarded_at: DateTime<Utc>,
}

impl AwardPayload {
    fn to_domain(self) -> Award {
        Award {
            id: self.id,
            name: self.name,
            awarded_at: self.awarded_at,
        }
    }
}

pub struct HttpBadgeAdapter {
    client: Client,
    base_url: String,
}

impl HttpBadgeAdapter {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> PortResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| PortError::Unexpected(format!("failed to build badge client: {}", e)))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn evaluation_url(&self, user_id: Uuid) -> String {
        format!("{}/users/{}/evaluate", self.base_url, user_id)
    }
}

#[async_trait]
impl BadgeEvaluator for HttpBadgeAdapter {
    async fn evaluate_and_award(&self, user_id: Uuid) -> PortResult<Vec<Award>> {
        let url = self.evaluation_url(user_id);
        debug!(%user_id, %url, "Requesting badge evaluation");

        let response = self
            .client
            .post(&url)
            .send()
            .await
            .map_err(|e| PortError::Unexpected(format!("badge service unreachable: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(PortError::Unexpected(format!(
                "badge service returned {}",
                status
            )));
        }

        let body: EvaluationResponse = response
            .json()
            .await
            .map_err(|e| PortError::Unexpected(format!("malformed badge response: {}", e)))?;

        Ok(body.awards.into_iter().map(|a| a.to_domain()).collect())
    }
}
