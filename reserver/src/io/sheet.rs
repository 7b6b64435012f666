//! Remote spreadsheet logging through a web-app endpoint.
//!
//! Delivery is best effort: failures are returned to the caller, which logs
//! them and moves on.

use std::future::Future;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::core::study_filter::StudyRecord;

/// Destination for newly matched studies.
pub trait SheetSink {
    fn append(&self, record: &StudyRecord) -> impl Future<Output = Result<()>> + Send;
}

/// Row sent to the web app, in spreadsheet column order.
#[derive(Debug, Serialize)]
struct SheetRow<'a> {
    date: &'a str,
    time: &'a str,
    title: &'a str,
    researcher: &'a str,
    reward: &'a str,
    places: &'a str,
}

impl<'a> From<&'a StudyRecord> for SheetRow<'a> {
    fn from(record: &'a StudyRecord) -> Self {
        Self {
            date: &record.date,
            time: &record.time,
            title: &record.title,
            researcher: &record.researcher,
            reward: &record.reward,
            places: &record.places,
        }
    }
}

#[derive(Debug, Deserialize)]
struct WebAppResponse {
    status: String,
    #[serde(default)]
    message: String,
}

/// Interpret the web app's JSON reply; returns its message on success.
fn interpret_response(body: &str) -> Result<String> {
    let reply: WebAppResponse =
        serde_json::from_str(body).with_context(|| format!("parse web app response: {body}"))?;
    if reply.status == "success" {
        Ok(reply.message)
    } else {
        Err(anyhow!("web app error: {}", reply.message))
    }
}

/// Posts rows as JSON to a spreadsheet web app.
#[derive(Debug, Clone)]
pub struct WebAppSink {
    client: reqwest::Client,
    url: String,
}

impl WebAppSink {
    pub fn new(url: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("build http client")?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

impl SheetSink for WebAppSink {
    #[instrument(skip_all, fields(study = %record.id))]
    async fn append(&self, record: &StudyRecord) -> Result<()> {
        let response = self
            .client
            .post(&self.url)
            .json(&SheetRow::from(record))
            .send()
            .await
            .context("post study to web app")?;
        let status = response.status();
        let body = response.text().await.context("read web app response")?;
        let message =
            interpret_response(&body).with_context(|| format!("web app replied {status}"))?;
        debug!(%message, "study logged to sheet");
        Ok(())
    }
}
