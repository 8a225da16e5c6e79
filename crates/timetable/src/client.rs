//! HTTP client for a remote timetable service.
//!
//! Implements [`ScheduleService`] and [`SubstituteService`] so the planner and
//! the replace flow can run against a server exactly as they run against the
//! local store. Writes are guarded: a second identical submission while the
//! first is outstanding fails with [`ServiceError::InProgress`].

use chrono::NaiveDate;
use rand::Rng;
use reqwest::{Client, Method, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::BTreeSet;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use url::Url;

use crate::availability::SlotAvailability;
use crate::conflict::OverwriteRequest;
use crate::guard::{SubmitGuard, SubmitTicket};
use crate::models::{
    ClassGroup, EntryDraft, EntryId, Location, ScheduleEntry, ScheduleFilter, Subject,
    Substitution, SubstitutionDraft, SubstitutionId, Teacher, TeacherId, TimeSlot,
};
use crate::server::types::ApiErrorBody;
use crate::server::NewSubstitutionRequest;
use crate::service::{ScheduleService, ServiceError, ServiceResult, SubstituteService};

pub struct TimetableClient {
    client: Client,
    base_url: Url,
    guard: SubmitGuard,
}

impl TimetableClient {
    /// Creates a client for the service at `base_url`, e.g. `http://127.0.0.1:8080/`.
    pub fn new(base_url: &str) -> ServiceResult<Self> {
        Self::with_guard(base_url, SubmitGuard::new())
    }

    /// Creates a client sharing `guard` with other clients.
    pub fn with_guard(base_url: &str, guard: SubmitGuard) -> ServiceResult<Self> {
        let mut base_url = Url::parse(base_url)?;
        // Url::join replaces the last segment unless the path ends with '/'
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| ServiceError::Transport {
                message: format!("Failed to build HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            base_url,
            guard,
        })
    }

    pub fn guard(&self) -> &SubmitGuard {
        &self.guard
    }

    fn url(&self, path: &str) -> ServiceResult<Url> {
        Ok(self.base_url.join(path)?)
    }

    fn begin(&self, key: String) -> ServiceResult<SubmitTicket> {
        self.guard.try_begin(key.clone()).ok_or_else(|| {
            warn!(key = %key, "Rejected duplicate submission");
            ServiceError::InProgress { key }
        })
    }

    /// Sends the request and returns the raw response body on success.
    ///
    /// The body is kept as bytes; decoding it as text would strip a leading BOM.
    async fn execute(&self, request: RequestBuilder, what: &str) -> ServiceResult<Vec<u8>> {
        let correlation_id = generate_correlation_id();
        let start = Instant::now();
        debug!(correlation_id = %correlation_id, "Sending {}", what);

        let response = request
            .header("x-correlation-id", &correlation_id)
            .send()
            .await?;
        let status = response.status();
        let body = response.bytes().await?.to_vec();

        debug!(
            correlation_id = %correlation_id,
            status = status.as_u16(),
            duration_ms = start.elapsed().as_millis() as u64,
            "{} finished",
            what
        );

        if status.is_success() {
            Ok(body)
        } else {
            let err = error_from_response(status, &String::from_utf8_lossy(&body));
            info!(correlation_id = %correlation_id, error = %err, "{} failed", what);
            Err(err)
        }
    }

    async fn call<T: DeserializeOwned>(&self, request: RequestBuilder, what: &str) -> ServiceResult<T> {
        let body = self.execute(request, what).await?;
        serde_json::from_slice(&body).map_err(|e| ServiceError::Transport {
            message: format!("Unexpected response to {}: {}", what, e),
        })
    }

    fn request<B: Serialize>(&self, method: Method, url: Url, body: Option<&B>) -> RequestBuilder {
        let request = self.client.request(method, url);
        match body {
            Some(body) => request.json(body),
            None => request,
        }
    }

    async fn get<T: DeserializeOwned>(&self, url: Url, what: &str) -> ServiceResult<T> {
        self.call(self.request::<()>(Method::GET, url, None), what).await
    }

    pub async fn teachers(&self) -> ServiceResult<Vec<Teacher>> {
        self.get(self.url("teachers")?, "teacher list").await
    }

    pub async fn subjects(&self) -> ServiceResult<Vec<Subject>> {
        self.get(self.url("subjects")?, "subject list").await
    }

    pub async fn class_groups(&self) -> ServiceResult<Vec<ClassGroup>> {
        self.get(self.url("class_groups")?, "class group list").await
    }

    pub async fn locations(&self) -> ServiceResult<Vec<Location>> {
        self.get(self.url("locations")?, "location list").await
    }

    pub async fn time_slots(&self) -> ServiceResult<Vec<TimeSlot>> {
        self.get(self.url("time_slots")?, "time slot list").await
    }

    /// Free candidates per time slot on `date`.
    pub async fn free_teachers(
        &self,
        date: NaiveDate,
        candidates: &BTreeSet<TeacherId>,
    ) -> ServiceResult<Vec<SlotAvailability>> {
        let ids: Vec<String> = candidates.iter().map(|id| id.to_string()).collect();
        let mut url = self.url("substitutions/free_teachers")?;
        url.query_pairs_mut()
            .append_pair("date", &date.to_string())
            .append_pair("candidates", &ids.join(","));
        self.get(url, "free teacher lookup").await
    }

    /// The day's substitutions as a BOM-prefixed CSV document.
    pub async fn export_csv(&self, date: NaiveDate) -> ServiceResult<String> {
        let mut url = self.url("substitutions/export")?;
        url.query_pairs_mut().append_pair("date", &date.to_string());
        let body = self
            .execute(self.request::<()>(Method::GET, url, None), "substitution export")
            .await?;
        String::from_utf8(body).map_err(|e| ServiceError::Transport {
            message: format!("Export was not valid UTF-8: {}", e),
        })
    }
}

impl ScheduleService for TimetableClient {
    async fn list_entries(&self, filter: &ScheduleFilter) -> ServiceResult<Vec<ScheduleEntry>> {
        let mut url = self.url("schedule")?;
        {
            let mut query = url.query_pairs_mut();
            if let Some(day) = filter.day {
                query.append_pair("day", day.as_str());
            }
            if let Some(year) = filter.academic_year {
                query.append_pair("academic_year", &year.to_string());
            }
            if let Some(semester) = filter.semester {
                query.append_pair("semester", &semester.to_string());
            }
        }
        // An empty query leaves a trailing '?'
        if url.query() == Some("") {
            url.set_query(None);
        }
        self.get(url, "schedule list").await
    }

    async fn add_entry(&self, draft: &EntryDraft) -> ServiceResult<ScheduleEntry> {
        let _ticket = self.begin(format!(
            "add_entry:{}:{}:{}",
            draft.day,
            draft.time_slot_id,
            draft.class_group.as_deref().unwrap_or_default()
        ))?;
        let url = self.url("schedule")?;
        self.call(self.request(Method::POST, url, Some(draft)), "add entry")
            .await
    }

    async fn update_entry(&self, id: EntryId, draft: &EntryDraft) -> ServiceResult<ScheduleEntry> {
        let _ticket = self.begin(format!("entry:{id}"))?;
        let url = self.url(&format!("schedule/{id}"))?;
        self.call(self.request(Method::PUT, url, Some(draft)), "update entry")
            .await
    }

    async fn delete_entry(&self, id: EntryId) -> ServiceResult<()> {
        let _ticket = self.begin(format!("entry:{id}"))?;
        let url = self.url(&format!("schedule/{id}"))?;
        self.execute(self.request::<()>(Method::DELETE, url, None), "delete entry")
            .await?;
        Ok(())
    }

    async fn overwrite_entry(&self, request: &OverwriteRequest) -> ServiceResult<ScheduleEntry> {
        let _ticket = self.begin(format!("overwrite:{}", request.conflicting_entry_id()))?;
        let url = self.url("schedule/overwrite")?;
        self.call(self.request(Method::POST, url, Some(request)), "overwrite entry")
            .await
    }
}

impl SubstituteService for TimetableClient {
    async fn substitutions_on(&self, date: NaiveDate) -> ServiceResult<Vec<Substitution>> {
        let mut url = self.url("substitutions")?;
        url.query_pairs_mut().append_pair("date", &date.to_string());
        self.get(url, "substitution list").await
    }

    async fn add_substitution(
        &self,
        draft: &SubstitutionDraft,
        replace_id: Option<SubstitutionId>,
    ) -> ServiceResult<Substitution> {
        let _ticket = self.begin(format!(
            "substitution:{}:{}",
            draft.date, draft.schedule_entry_id
        ))?;
        let body = NewSubstitutionRequest {
            substitution: draft.clone(),
            replace_id,
        };
        let url = self.url("substitutions")?;
        self.call(self.request(Method::POST, url, Some(&body)), "add substitution")
            .await
    }

    async fn delete_substitution(&self, id: SubstitutionId) -> ServiceResult<()> {
        let _ticket = self.begin(format!("delete_substitution:{id}"))?;
        let url = self.url(&format!("substitutions/{id}"))?;
        self.execute(
            self.request::<()>(Method::DELETE, url, None),
            "delete substitution",
        )
        .await?;
        Ok(())
    }
}

/// Maps an error response back into the service error it came from.
fn error_from_response(status: StatusCode, body: &str) -> ServiceError {
    let parsed: Option<ApiErrorBody> = serde_json::from_str(body).ok();
    let message = match &parsed {
        Some(err) => err.error.clone(),
        None if body.trim().is_empty() => format!("Request failed with status {}", status),
        None => body.trim().to_string(),
    };

    match (status, parsed) {
        (StatusCode::BAD_REQUEST, _) => ServiceError::Validation(message),
        (StatusCode::NOT_FOUND, _) => ServiceError::NotFound { message },
        (StatusCode::CONFLICT, Some(err)) => match (err.conflict, err.existing) {
            (Some(conflict), _) => ServiceError::ScheduleConflict(Box::new(conflict)),
            (None, Some(existing)) => ServiceError::SubstitutionConflict {
                existing: Box::new(existing),
                message,
            },
            (None, None) => ServiceError::InProgress { key: message },
        },
        _ => ServiceError::Transport { message },
    }
}

/// Generates a unique correlation ID for request tracing.
fn generate_correlation_id() -> String {
    use std::time::{SystemTime, UNIX_EPOCH};
    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_micros();
    let random: u32 = rand::thread_rng().gen();
    format!("{:x}-{:08x}", timestamp & 0xFFFFFFFF, random)
}
