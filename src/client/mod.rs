//! Attendance Service HTTP client.
//!
//! Wire-faithful consumption of the remote attendance API:
//! punch status and today's schedule reads, check-in/check-out submissions.
//! The engine talks to the [`AttendanceClient`] trait so tests can substitute
//! a scripted mock.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;
use url::Url;

use crate::geo::Coordinates;

/// Errors from the attendance service boundary.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Invalid base URL: {0}")]
    InvalidBaseUrl(String),

    #[error("HTTP {status}: {message}")]
    HttpStatus { status: u16, message: String },
}

/// Server-side punch status for the current day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PunchStatusResponse {
    pub actual_in_time: Option<DateTime<Utc>>,
    pub actual_out_time: Option<DateTime<Utc>>,
    pub current_status: PunchStatusKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PunchStatusKind {
    In,
    Out,
}

/// Today's schedule lookup. Every level is optional on the wire; a missing
/// schedule is not an error, the caller falls back to the default.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScheduleResponse {
    pub schedule_info: Option<ScheduleInfo>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScheduleInfo {
    pub expected_work_duration: Option<ExpectedWorkDuration>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpectedWorkDuration {
    pub total_minutes: i64,
}

impl ScheduleResponse {
    /// Expected minutes for the day, if the schedule carried them.
    pub fn expected_work_minutes(&self) -> Option<i64> {
        self.schedule_info
            .as_ref()
            .and_then(|info| info.expected_work_duration.as_ref())
            .map(|d| d.total_minutes)
    }
}

/// Punch submission body: `{ employeeId, geolocation?: "lat,long" }`.
#[derive(Debug, Serialize)]
struct PunchRequest<'a> {
    #[serde(rename = "employeeId")]
    employee_id: &'a str,

    #[serde(skip_serializing_if = "Option::is_none")]
    geolocation: Option<String>,
}

/// Remote attendance service boundary.
#[async_trait]
pub trait AttendanceClient: Send + Sync {
    /// Fetch the authoritative punch status for the employee.
    async fn punch_status(&self, employee_id: &str) -> Result<PunchStatusResponse, ClientError>;

    /// Fetch today's schedule.
    async fn today_schedule(&self) -> Result<ScheduleResponse, ClientError>;

    /// Submit a check-in; success is the service's 2xx acknowledgement.
    async fn check_in(
        &self,
        employee_id: &str,
        geolocation: Option<Coordinates>,
    ) -> Result<(), ClientError>;

    /// Submit a check-out.
    async fn check_out(
        &self,
        employee_id: &str,
        geolocation: Option<Coordinates>,
    ) -> Result<(), ClientError>;
}

/// reqwest-backed client.
pub struct HttpAttendanceClient {
    client: reqwest::Client,
    base_url: Url,
}

impl HttpAttendanceClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ClientError> {
        let base_url = Url::parse(base_url)
            .map_err(|e| ClientError::InvalidBaseUrl(format!("{}: {}", base_url, e)))?;

        let client = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self { client, base_url })
    }

    fn endpoint(&self, path: &str) -> Result<Url, ClientError> {
        self.base_url
            .join(path)
            .map_err(|e| ClientError::InvalidBaseUrl(format!("{}: {}", path, e)))
    }

    async fn submit_punch(
        &self,
        path: &str,
        employee_id: &str,
        geolocation: Option<Coordinates>,
    ) -> Result<(), ClientError> {
        let url = self.endpoint(path)?;
        let body = PunchRequest {
            employee_id,
            geolocation: geolocation.map(|c| c.to_string()),
        };

        debug!("Submitting {} for employee {}", path, employee_id);
        let response = self.client.post(url).json(&body).send().await?;
        Self::check_status(&response)?;
        Ok(())
    }

    fn check_status(response: &reqwest::Response) -> Result<(), ClientError> {
        let status = response.status();
        if !status.is_success() {
            return Err(ClientError::HttpStatus {
                status: status.as_u16(),
                message: status.canonical_reason().unwrap_or("Unknown").to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl AttendanceClient for HttpAttendanceClient {
    async fn punch_status(&self, employee_id: &str) -> Result<PunchStatusResponse, ClientError> {
        let mut url = self.endpoint("punch-status")?;
        url.query_pairs_mut().append_pair("employeeId", employee_id);

        let response = self.client.get(url).send().await?;
        Self::check_status(&response)?;
        Ok(response.json().await?)
    }

    async fn today_schedule(&self) -> Result<ScheduleResponse, ClientError> {
        let url = self.endpoint("today-schedule")?;

        let response = self.client.get(url).send().await?;
        Self::check_status(&response)?;
        Ok(response.json().await?)
    }

    async fn check_in(
        &self,
        employee_id: &str,
        geolocation: Option<Coordinates>,
    ) -> Result<(), ClientError> {
        self.submit_punch("check-in", employee_id, geolocation).await
    }

    async fn check_out(
        &self,
        employee_id: &str,
        geolocation: Option<Coordinates>,
    ) -> Result<(), ClientError> {
        self.submit_punch("check-out", employee_id, geolocation)
            .await
    }
}

/// Scripted in-memory client for tests.
#[cfg(test)]
pub struct MockAttendanceClient {
    status: std::sync::Mutex<Result<PunchStatusResponse, String>>,
    schedule: std::sync::Mutex<Result<ScheduleResponse, String>>,
    fail_submissions: std::sync::atomic::AtomicBool,
    submission_calls: std::sync::atomic::AtomicUsize,
    submission_gate: std::sync::Mutex<Option<std::sync::Arc<tokio::sync::Notify>>>,
    status_gate: std::sync::Mutex<Option<std::sync::Arc<tokio::sync::Notify>>>,
    last_submission: std::sync::Mutex<Option<(String, String, Option<String>)>>,
}

#[cfg(test)]
impl MockAttendanceClient {
    pub fn new(status: PunchStatusResponse, schedule: ScheduleResponse) -> Self {
        Self {
            status: std::sync::Mutex::new(Ok(status)),
            schedule: std::sync::Mutex::new(Ok(schedule)),
            fail_submissions: std::sync::atomic::AtomicBool::new(false),
            submission_calls: std::sync::atomic::AtomicUsize::new(0),
            submission_gate: std::sync::Mutex::new(None),
            status_gate: std::sync::Mutex::new(None),
            last_submission: std::sync::Mutex::new(None),
        }
    }

    pub fn checked_out(expected_minutes: i64) -> Self {
        Self::new(
            PunchStatusResponse {
                actual_in_time: None,
                actual_out_time: None,
                current_status: PunchStatusKind::Out,
            },
            ScheduleResponse {
                schedule_info: Some(ScheduleInfo {
                    expected_work_duration: Some(ExpectedWorkDuration {
                        total_minutes: expected_minutes,
                    }),
                }),
            },
        )
    }

    pub fn set_status(&self, status: PunchStatusResponse) {
        *self.status.lock().unwrap() = Ok(status);
    }

    pub fn set_status_error(&self, message: impl Into<String>) {
        *self.status.lock().unwrap() = Err(message.into());
    }

    pub fn set_schedule(&self, schedule: ScheduleResponse) {
        *self.schedule.lock().unwrap() = Ok(schedule);
    }

    pub fn set_schedule_error(&self, message: impl Into<String>) {
        *self.schedule.lock().unwrap() = Err(message.into());
    }

    pub fn set_fail_submissions(&self, fail: bool) {
        self.fail_submissions
            .store(fail, std::sync::atomic::Ordering::SeqCst);
    }

    /// Hold every subsequent submission open until the gate is notified.
    pub fn gate_submissions(&self, gate: std::sync::Arc<tokio::sync::Notify>) {
        *self.submission_gate.lock().unwrap() = Some(gate);
    }

    /// Hold every subsequent status fetch open until the gate is notified.
    pub fn gate_status_fetches(&self, gate: std::sync::Arc<tokio::sync::Notify>) {
        *self.status_gate.lock().unwrap() = Some(gate);
    }

    pub fn submission_calls(&self) -> usize {
        self.submission_calls
            .load(std::sync::atomic::Ordering::SeqCst)
    }

    /// `(path, employee_id, geolocation)` of the most recent submission.
    pub fn last_submission(&self) -> Option<(String, String, Option<String>)> {
        self.last_submission.lock().unwrap().clone()
    }

    async fn record_submission(
        &self,
        path: &str,
        employee_id: &str,
        geolocation: Option<Coordinates>,
    ) -> Result<(), ClientError> {
        self.submission_calls
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        *self.last_submission.lock().unwrap() = Some((
            path.to_string(),
            employee_id.to_string(),
            geolocation.map(|c| c.to_string()),
        ));

        let gate = self.submission_gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }

        if self.fail_submissions.load(std::sync::atomic::Ordering::SeqCst) {
            return Err(ClientError::HttpStatus {
                status: 503,
                message: "Service Unavailable".to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
#[async_trait]
impl AttendanceClient for MockAttendanceClient {
    async fn punch_status(&self, _employee_id: &str) -> Result<PunchStatusResponse, ClientError> {
        let gate = self.status_gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }

        self.status
            .lock()
            .unwrap()
            .clone()
            .map_err(|message| ClientError::HttpStatus {
                status: 500,
                message,
            })
    }

    async fn today_schedule(&self) -> Result<ScheduleResponse, ClientError> {
        self.schedule
            .lock()
            .unwrap()
            .clone()
            .map_err(|message| ClientError::HttpStatus {
                status: 500,
                message,
            })
    }

    async fn check_in(
        &self,
        employee_id: &str,
        geolocation: Option<Coordinates>,
    ) -> Result<(), ClientError> {
        self.record_submission("check-in", employee_id, geolocation)
            .await
    }

    async fn check_out(
        &self,
        employee_id: &str,
        geolocation: Option<Coordinates>,
    ) -> Result<(), ClientError> {
        self.record_submission("check-out", employee_id, geolocation)
            .await
    }
}
