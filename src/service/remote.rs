//! HTTP client of the exercise backend, used by signed-in learners.

use std::time::Duration;

use reqwest::{Client, Method, RequestBuilder, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use super::wire::{
    self, AuthResponse, Category, LeaderboardEntry, LeaderboardPosition, LeaderboardScope,
    ProfileUpdate, ValidationResponse,
};
use super::{ExerciseService, ScoreTotals, SessionContext, Submission, User};
use crate::config::Config;
use crate::error::ServiceError;
use crate::exercise::{Difficulty, ExerciseKind, ExerciseSpec, UserAnswer};
use crate::scoring::{self, ValidationResult};

/// Client of the REST backend.
#[derive(Debug, Clone)]
pub struct RemoteService {
    client: Client,
    base_url: String,
    token: Option<String>,
}

impl RemoteService {
    pub fn new(config: &Config, session: &SessionContext) -> Result<Self, ServiceError> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .build()?;
        Ok(RemoteService {
            client,
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
            token: session.token().map(str::to_string),
        })
    }

    /// Client without a session, for signing in.
    pub fn anonymous(config: &Config) -> Result<Self, ServiceError> {
        Self::new(config, &SessionContext::guest())
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let builder = self.client.request(method, self.url(path));
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    fn authed(&self, method: Method, path: &str) -> Result<RequestBuilder, ServiceError> {
        if self.token.is_none() {
            return Err(ServiceError::NotAuthenticated);
        }
        Ok(self.request(method, path))
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, ServiceError> {
        let response = request.send().await?;
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            if status == StatusCode::UNAUTHORIZED {
                tracing::warn!("backend rejected the session token");
            }
            return Err(ServiceError::Status {
                status: status.as_u16(),
                message: error_message(&body, status),
            });
        }
        Ok(serde_json::from_str(&body)?)
    }

    async fn post<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ServiceError> {
        self.send(self.request(Method::POST, path).json(body)).await
    }

    // ── Account ────────────────────────────────────────────────────────

    pub async fn login(&self, email: &str, password: &str) -> Result<SessionContext, ServiceError> {
        let body = serde_json::json!({ "email": email, "password": password });
        let auth: AuthResponse = self.post("/auth/login", &body).await?;
        tracing::info!(user = %auth.user.username, "signed in");
        Ok(SessionContext::authenticated(auth.token, auth.user))
    }

    pub async fn register(
        &self,
        email: &str,
        password: &str,
        username: &str,
    ) -> Result<SessionContext, ServiceError> {
        let body = serde_json::json!({
            "email": email,
            "password": password,
            "username": username,
        });
        let auth: AuthResponse = self.post("/auth/register", &body).await?;
        tracing::info!(user = %auth.user.username, "registered");
        Ok(SessionContext::authenticated(auth.token, auth.user))
    }

    pub async fn profile(&self) -> Result<User, ServiceError> {
        self.send(self.authed(Method::GET, "/user/profile")?).await
    }

    pub async fn update_profile(&self, update: &ProfileUpdate) -> Result<User, ServiceError> {
        self.send(self.authed(Method::PUT, "/user/update")?.json(update))
            .await
    }

    /// Raw per-category score history.
    pub async fn scores(&self) -> Result<Value, ServiceError> {
        self.send(self.authed(Method::GET, "/user/scores")?).await
    }

    pub async fn categories(&self) -> Result<Vec<Category>, ServiceError> {
        self.send(self.request(Method::GET, "/exercise/categories"))
            .await
    }

    // ── Leaderboards ───────────────────────────────────────────────────

    pub async fn global_leaderboard(
        &self,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<LeaderboardEntry>, ServiceError> {
        self.send(
            self.request(Method::GET, "/leaderboard/global")
                .query(&[("limit", limit), ("offset", offset)]),
        )
        .await
    }

    pub async fn exercise_leaderboard(
        &self,
        kind: ExerciseKind,
        difficulty: Option<Difficulty>,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<LeaderboardEntry>, ServiceError> {
        let mut request = self
            .request(Method::GET, &format!("/leaderboard/exercise/{}", kind.category()))
            .query(&[("limit", limit), ("offset", offset)]);
        if let Some(d) = difficulty {
            request = request.query(&[("difficulty", d.as_str())]);
        }
        self.send(request).await
    }

    /// The signed-in user's rank, `None` when unranked.
    pub async fn leaderboard_position(&self, scope: LeaderboardScope) -> Result<Option<u32>, ServiceError> {
        let request = match scope {
            LeaderboardScope::Global => self.authed(Method::GET, "/leaderboard/position/global")?,
            LeaderboardScope::Exercise { kind, difficulty } => {
                let mut request = self.authed(
                    Method::GET,
                    &format!("/leaderboard/position/exercise/{}", kind.category()),
                )?;
                if let Some(d) = difficulty {
                    request = request.query(&[("difficulty", d.as_str())]);
                }
                request
            }
        };
        let position: LeaderboardPosition = self.send(request).await?;
        Ok(position.rank)
    }
}

impl ExerciseService for RemoteService {
    async fn fetch_exercise(
        &self,
        kind: ExerciseKind,
        difficulty: Difficulty,
    ) -> Result<ExerciseSpec, ServiceError> {
        let request = self
            .request(Method::GET, &format!("/exercise/{}", kind.category()))
            .query(&[("difficulty", difficulty.as_str())]);
        let payload: Value = self.send(request).await?;
        let spec = wire::exercise_from_json(kind, &payload)?;
        tracing::debug!(id = %spec.id, %kind, "fetched exercise");
        Ok(spec)
    }

    async fn validate(
        &self,
        exercise: &ExerciseSpec,
        answer: &UserAnswer,
    ) -> Result<ValidationResult, ServiceError> {
        let profile = exercise.kind.profile();
        let local = profile.verdict(exercise, answer)?;
        let body = wire::validate_body(exercise, answer)?;
        let path = format!("/exercise/{}/validate", exercise.kind.category());
        let response: ValidationResponse = self.post(&path, &body).await?;

        let remote = merge_verdict(local.clone(), &response);
        if !scoring::agrees(&local, &remote) {
            tracing::warn!(
                id = %exercise.id,
                local_correct = local.is_correct,
                remote_correct = remote.is_correct,
                local_accuracy = local.accuracy,
                remote_accuracy = remote.accuracy,
                "backend verdict differs from local scoring"
            );
        }
        Ok(remote)
    }

    async fn submit(&self, submission: &Submission) -> Result<Option<ScoreTotals>, ServiceError> {
        let _: Value = self
            .send(self.authed(Method::POST, "/exercise/submit")?.json(submission))
            .await?;
        Ok(None)
    }
}

/// The backend's verdict wins; local scoring fills in the detail and, when
/// the backend sends none, the message.
fn merge_verdict(local: ValidationResult, response: &ValidationResponse) -> ValidationResult {
    let message = if response.message.is_empty() {
        local.message
    } else {
        response.message.clone()
    };
    ValidationResult {
        is_correct: response.is_correct,
        accuracy: response.accuracy(),
        message,
        detail: local.detail,
    }
}

fn error_message(body: &str, status: StatusCode) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| {
            ["message", "error"]
                .iter()
                .find_map(|k| v.get(*k).and_then(Value::as_str).map(str::to_string))
        })
        .unwrap_or_else(|| status.canonical_reason().unwrap_or("request failed").to_string())
}
