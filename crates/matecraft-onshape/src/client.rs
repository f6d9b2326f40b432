//! reqwest-backed [`CadService`] and [`ScriptEvaluator`].

use crate::config::OnshapeConfig;
use crate::{fsvalue, wire};
use async_trait::async_trait;
use matecraft_core::model::parse_features;
use matecraft_core::{
    AssemblyDefinition, AssemblyQuery, CadService, ElementPath, InstanceSource, MateError,
    MateFeature, ResolvedFeature, Result, Script, ScriptEvaluator,
};
use reqwest::{Client, RequestBuilder};
use serde_json::Value;
use url::Url;

/// One authenticated session against the CAD platform.
///
/// Cloning is cheap: the underlying connection pool is shared.
#[derive(Clone)]
pub struct OnshapeClient {
    http: Client,
    config: OnshapeConfig,
    token: String,
}

impl OnshapeClient {
    pub fn new(config: OnshapeConfig, token: &str) -> Result<Self> {
        let http = build_http_client(&config)?;
        Ok(Self::with_client(http, config, token))
    }

    /// Reuse an existing connection pool (one per server, one session per
    /// request).
    pub fn with_client(http: Client, config: OnshapeConfig, token: &str) -> Self {
        Self {
            http,
            config,
            token: token.to_string(),
        }
    }

    fn url(&self, rest: &str) -> Result<Url> {
        let endpoint = self.config.endpoint(rest);
        Url::parse(&endpoint).map_err(|e| MateError::Config(format!("endpoint `{endpoint}`: {e}")))
    }

    async fn send(&self, request: RequestBuilder, what: &str) -> Result<Value> {
        let response = request
            .bearer_auth(&self.token)
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| MateError::Transport(format!("{what}: {e}")))?;

        let status = response.status();
        tracing::debug!(request = what, status = status.as_u16(), "CAD API response");
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(MateError::Api {
                status: status.as_u16(),
                message: format!("{what}: {message}"),
            });
        }

        let text = response
            .text()
            .await
            .map_err(|e| MateError::Transport(format!("{what}: {e}")))?;
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&text).map_err(|e| MateError::malformed(what, e))
    }

    async fn get(&self, url: Url, what: &str) -> Result<Value> {
        self.send(self.http.get(url), what).await
    }

    async fn post(&self, url: Url, body: &Value, what: &str) -> Result<Value> {
        self.send(self.http.post(url).json(body), what).await
    }
}

pub fn build_http_client(config: &OnshapeConfig) -> Result<Client> {
    Client::builder()
        .timeout(config.timeout())
        .build()
        .map_err(|e| MateError::Config(format!("HTTP client: {e}")))
}

#[async_trait]
impl CadService for OnshapeClient {
    async fn get_assembly(&self, path: &ElementPath, query: AssemblyQuery) -> Result<AssemblyDefinition> {
        let mut url = self.url(&format!("assemblies/{path}"))?;
        url.query_pairs_mut()
            .append_pair("includeMateFeatures", &query.include_mate_features.to_string())
            .append_pair("includeMateConnectors", &query.include_mate_connectors.to_string());
        let value = self.get(url, "get assembly").await?;
        AssemblyDefinition::from_json(value)
    }

    async fn get_assembly_features(&self, path: &ElementPath) -> Result<Vec<MateFeature>> {
        let url = self.url(&format!("assemblies/{path}/features"))?;
        let value = self.get(url, "get assembly features").await?;
        parse_features(&value)
    }

    async fn add_instance(&self, assembly: &ElementPath, source: &InstanceSource) -> Result<()> {
        let url = self.url(&format!("assemblies/{assembly}/instances"))?;
        self.post(url, &wire::instance_body(source), "add instance").await?;
        tracing::debug!(assembly = %assembly, source = %source.path, part = ?source.part_id, "instance added");
        Ok(())
    }

    async fn add_feature(&self, assembly: &ElementPath, feature: &ResolvedFeature) -> Result<()> {
        let url = self.url(&format!("assemblies/{assembly}/features"))?;
        self.post(url, &wire::feature_body(feature), "add feature").await?;
        tracing::debug!(assembly = %assembly, name = %feature.name, "feature added");
        Ok(())
    }
}

#[async_trait]
impl ScriptEvaluator for OnshapeClient {
    async fn evaluate(&self, path: &ElementPath, script: Script) -> Result<Value> {
        let source = match script {
            Script::ClassifyPartStudio => &self.config.classify_script,
            Script::ResolveTarget => &self.config.target_script,
        };
        let url = self.url(&format!("partstudios/{path}/featurescript"))?;
        let response = self.post(url, &wire::featurescript_body(source), "evaluate featurescript").await?;
        decode_evaluation(&response)
    }
}

/// Unwrap the `result` node of a FeatureScript evaluation response.
pub fn decode_evaluation(response: &Value) -> Result<Value> {
    let result = response
        .get("result")
        .ok_or_else(|| MateError::MalformedResponse("featurescript: missing `result`".to_string()))?;
    fsvalue::decode(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decode_evaluation_requires_result() {
        assert!(decode_evaluation(&json!({ "notices": [] })).is_err());
        let value = decode_evaluation(&json!({
            "result": { "btType": "BTFSValueMap-2062", "value": [
                { "key": { "btType": "BTFSValueString-1422", "value": "targetMateId" },
                  "value": { "btType": "BTFSValueString-1422", "value": "T1" } }
            ]}
        }))
        .unwrap();
        assert_eq!(value, json!({ "targetMateId": "T1" }));
    }

    #[test]
    fn test_endpoint_urls() {
        let client = OnshapeClient::new(OnshapeConfig::default(), "tok").unwrap();
        let path = ElementPath::new(matecraft_core::DocumentPath::workspace("d", "w"), "e");
        let url = client.url(&format!("assemblies/{path}/features")).unwrap();
        assert_eq!(url.as_str(), "https://cad.onshape.com/api/v6/assemblies/d/d/w/w/e/e/features");
    }

    #[tokio::test]
    async fn test_unreachable_host_is_transport_error() {
        let config = OnshapeConfig::default()
            .with_base_url("http://127.0.0.1:9")
            .unwrap()
            .with_timeout_secs(2);
        let client = OnshapeClient::new(config, "tok").unwrap();
        let path = ElementPath::new(matecraft_core::DocumentPath::workspace("d", "w"), "e");
        let err = client.get_assembly_features(&path).await.unwrap_err();
        assert!(matches!(err, MateError::Transport(_)));
    }
}
