//! External scorer client
//!
//! For every decision event the worker PUTs the labelled example
//! `{"updates": [step, features]}` and POSTs the features alone,
//! `{"features": [features]}`. A response carrying
//! `{"predictions": [{step: probability, ...}]}` is compared against the
//! decision and logged as a hit or a miss. Failures are logged and the
//! event is dropped.

use super::DecisionEvent;
use crate::cluster::StoreId;
use crate::config::TelemetryConfig;
use crate::error::Result;
use regex::Regex;
use reqwest::Method;
use serde_json::{json, Value};
use std::sync::OnceLock;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// The scorer's most probable step
#[derive(Debug, Clone, PartialEq)]
pub struct Prediction {
    pub step: String,
    pub probability: f64,
}

/// Outcome of comparing a prediction with the actual decision
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Hit,
    Miss,
}

/// Most probable step in a scorer response, `None` when it has no predictions
pub fn parse_prediction(body: &str) -> Option<Prediction> {
    let value: Value = serde_json::from_str(body).ok()?;
    let scores = value.get("predictions")?.get(0)?.as_object()?;

    let mut best: Option<Prediction> = None;
    for (step, probability) in scores {
        let Some(probability) = probability.as_f64() else {
            continue;
        };
        if best.as_ref().map_or(true, |b| probability > b.probability) {
            best = Some(Prediction {
                step: step.clone(),
                probability,
            });
        }
    }
    best
}

/// Source and destination stores named in a step description
pub fn parse_step_stores(step: &str) -> Option<(StoreId, StoreId)> {
    static STEP_STORES: OnceLock<Regex> = OnceLock::new();
    let re = STEP_STORES
        .get_or_init(|| Regex::new(r"from store (\d+) to store (\d+)").expect("valid step regex"));

    let caps = re.captures(step)?;
    let from = caps.get(1)?.as_str().parse().ok()?;
    let to = caps.get(2)?.as_str().parse().ok()?;
    Some((from, to))
}

/// Background task forwarding decision events to the scorer
#[derive(Debug, Clone)]
pub struct ScorerWorker {
    client: reqwest::Client,
    url: String,
}

impl ScorerWorker {
    pub fn new(config: &TelemetryConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()?;
        Ok(Self {
            client,
            url: config.url.clone(),
        })
    }

    /// Start draining `rx` on the current runtime
    pub fn spawn(self, rx: mpsc::Receiver<DecisionEvent>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            self.run(rx).await;
        })
    }

    /// Score events until every sender is dropped
    pub async fn run(self, mut rx: mpsc::Receiver<DecisionEvent>) {
        info!("Scorer worker started, forwarding decisions to {}", self.url);
        while let Some(event) = rx.recv().await {
            self.score(&event).await;
        }
        info!("Scorer worker stopped");
    }

    /// Forward one event; returns the verdict of the last prediction received
    pub async fn score(&self, event: &DecisionEvent) -> Option<Verdict> {
        if event.step.is_empty() || event.features.is_empty() {
            debug!("Skipping decision event without step or features");
            return None;
        }

        let update = json!({ "updates": [event.step, event.features] });
        let query = json!({ "features": [event.features] });

        let mut verdict = None;
        for (method, body) in [(Method::PUT, update), (Method::POST, query)] {
            let Some(response) = self.send(method, &body).await else {
                continue;
            };
            if let Some(prediction) = parse_prediction(&response) {
                verdict = Some(self.judge(event, &prediction));
            }
        }
        verdict
    }

    async fn send(&self, method: Method, body: &Value) -> Option<String> {
        let resp = match self
            .client
            .request(method.clone(), &self.url)
            .json(body)
            .send()
            .await
        {
            Ok(resp) => resp,
            Err(e) => {
                warn!("Scorer request {} {} failed: {}", method, self.url, e);
                return None;
            }
        };

        let status = resp.status();
        match resp.text().await {
            Ok(text) => {
                debug!("Scorer {} {} returned {}: {}", method, self.url, status, text);
                Some(text)
            }
            Err(e) => {
                warn!("Failed to read scorer response ({}): {}", status, e);
                None
            }
        }
    }

    fn judge(&self, event: &DecisionEvent, prediction: &Prediction) -> Verdict {
        let predicted = parse_step_stores(&prediction.step);
        if predicted == Some((event.source_store, event.dest_store)) {
            info!(
                "Scorer suggested '{}' (p={:.6}) [HIT]",
                prediction.step, prediction.probability
            );
            Verdict::Hit
        } else {
            info!(
                "Scorer suggested '{}' (p={:.6}) [MISS], actual store {} -> store {}",
                prediction.step, prediction.probability, event.source_store, event.dest_store
            );
            Verdict::Miss
        }
    }
}
