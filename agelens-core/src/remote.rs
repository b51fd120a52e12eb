//! Remote estimate collaborator: the last tier before the synthesized record.

use std::{future::Future, time::Duration};

use agelens_utils::{config::RemoteSettings, encode_jpeg_data_url};
use log::debug;
use serde::{Deserialize, Serialize};

use crate::{
    error::RemoteEstimateError,
    geometry::{NaturalSpace, Rect},
    record::{AgeGender, Gender},
};

/// One entry of a remote estimate response.
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RemoteEstimate {
    pub age: Option<f32>,
    pub gender: Option<String>,
    pub gender_probability: Option<f32>,
    pub confidence: Option<f32>,
    pub position: Option<Rect<NaturalSpace>>,
}

impl RemoteEstimate {
    pub fn attributes(&self) -> AgeGender {
        AgeGender {
            age: self.age,
            gender: self.gender.as_deref().map(Gender::from_label),
            gender_probability: self.gender_probability,
        }
    }
}

/// Estimates age and gender from an encoded JPEG crop.
pub trait RemoteEstimator: Send + Sync {
    fn estimate(
        &self,
        jpeg: Vec<u8>,
    ) -> impl Future<Output = Result<Vec<RemoteEstimate>, RemoteEstimateError>> + Send;
}

/// `None` behaves as a collaborator that is switched off.
impl<R: RemoteEstimator> RemoteEstimator for Option<R> {
    fn estimate(
        &self,
        jpeg: Vec<u8>,
    ) -> impl Future<Output = Result<Vec<RemoteEstimate>, RemoteEstimateError>> + Send {
        async move {
            match self {
                Some(remote) => remote.estimate(jpeg).await,
                None => Err(RemoteEstimateError::Disabled),
            }
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct EstimateRequest {
    image_data: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct EstimateResponse {
    results: Vec<RemoteEstimate>,
    #[serde(default)]
    is_estimate: bool,
}

/// JSON-over-HTTP estimator posting `{ "imageData": "data:image/jpeg;base64,..." }`.
#[derive(Debug, Clone)]
pub struct HttpRemoteEstimator {
    client: reqwest::Client,
    endpoint: String,
    timeout: Duration,
}

impl HttpRemoteEstimator {
    pub fn new(
        endpoint: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, RemoteEstimateError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("agelens/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
            timeout,
        })
    }

    /// Build an estimator when `settings` names an endpoint.
    pub fn from_settings(settings: &RemoteSettings) -> Result<Option<Self>, RemoteEstimateError> {
        settings
            .endpoint
            .as_deref()
            .map(|endpoint| Self::new(endpoint, settings.timeout()))
            .transpose()
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn post(&self, jpeg: Vec<u8>) -> Result<Vec<RemoteEstimate>, RemoteEstimateError> {
        let request = EstimateRequest {
            image_data: encode_jpeg_data_url(&jpeg),
        };
        let response = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(RemoteEstimateError::Status(status.as_u16()));
        }

        let body = response.bytes().await.map_err(|e| self.transport_error(e))?;
        let payload: EstimateResponse = serde_json::from_slice(&body)
            .map_err(|e| RemoteEstimateError::Parse(e.to_string()))?;
        debug!(
            "remote estimate returned {} result(s) (estimate flag {})",
            payload.results.len(),
            payload.is_estimate
        );
        if payload.results.is_empty() {
            return Err(RemoteEstimateError::Empty);
        }
        Ok(payload.results)
    }

    fn transport_error(&self, err: reqwest::Error) -> RemoteEstimateError {
        if err.is_timeout() {
            RemoteEstimateError::Timeout(self.timeout)
        } else {
            RemoteEstimateError::Transport(err)
        }
    }
}

impl RemoteEstimator for HttpRemoteEstimator {
    fn estimate(
        &self,
        jpeg: Vec<u8>,
    ) -> impl Future<Output = Result<Vec<RemoteEstimate>, RemoteEstimateError>> + Send {
        self.post(jpeg)
    }
}
