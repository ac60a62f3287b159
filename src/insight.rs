//! Insight pipeline
//!
//! Orchestrates plan -> fetch -> answer. The two model calls sit behind
//! `DataPlanner` and `InsightGenerator`; everything else is local. The
//! pipeline never fails outward: every error becomes a message answer with
//! no chart.

use crate::error::Result;
use crate::params::ParameterSet;
use crate::prompts::{answer_prompt, planner_prompt};
use crate::service::LedgerService;
use crate::tenant::TenantId;
use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{error, info, warn};

lazy_static::lazy_static! {
    static ref JSON_BLOCK: Regex = Regex::new(r"(?s)\{.*\}").expect("valid JSON block pattern");
}

pub const NO_LEDGER_MESSAGE: &str =
    "User sales data not found. Please ensure you have added sales data for this phone number.";
pub const PLANNING_FAILED_MESSAGE: &str = "AI could not plan data retrieval. Please rephrase.";
const NO_INSIGHT_MESSAGE: &str = "No insight provided.";

/// Turns a planner prompt into raw model text
#[async_trait]
pub trait DataPlanner: Send + Sync {
    async fn plan(&self, prompt: &str) -> Result<String>;
}

/// Turns an answer prompt into raw model text
#[async_trait]
pub trait InsightGenerator: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String>;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChartType {
    BarChart,
    LineChart,
    PieChart,
    #[default]
    #[serde(other)]
    None,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChartSpec {
    #[serde(rename = "type", default)]
    pub chart_type: ChartType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_parameters: Option<Value>,
}

impl ChartSpec {
    pub fn none() -> Self {
        Self::default()
    }

    /// Parameters for the chart-data path, when the chart asks for any
    pub fn parameters(&self) -> Option<ParameterSet> {
        if self.chart_type == ChartType::None {
            return None;
        }
        self.data_parameters.as_ref().map(ParameterSet::from_json)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InsightAnswer {
    pub full_answer: String,
    #[serde(rename = "chart_data")]
    pub chart: ChartSpec,
}

impl InsightAnswer {
    fn message(text: impl Into<String>) -> Self {
        Self {
            full_answer: text.into(),
            chart: ChartSpec::none(),
        }
    }
}

/// Outermost `{...}` block of a model response
pub fn extract_json_block(text: &str) -> Option<&str> {
    JSON_BLOCK.find(text).map(|m| m.as_str())
}

pub struct InsightPipeline<'a, P, G> {
    service: &'a LedgerService,
    planner: P,
    generator: G,
}

impl<'a, P, G> InsightPipeline<'a, P, G>
where
    P: DataPlanner,
    G: InsightGenerator,
{
    pub fn new(service: &'a LedgerService, planner: P, generator: G) -> Self {
        Self {
            service,
            planner,
            generator,
        }
    }

    pub async fn answer(&self, question: &str, tenant: &TenantId) -> InsightAnswer {
        if !self.service.store().ledger_exists(tenant) {
            warn!(tenant = %tenant, "{}", NO_LEDGER_MESSAGE);
            return InsightAnswer::message(NO_LEDGER_MESSAGE);
        }

        let data_json = match self.gather(question, tenant).await {
            Ok(Some(data_json)) => data_json,
            Ok(None) => return InsightAnswer::message(PLANNING_FAILED_MESSAGE),
            Err(e) => {
                error!(tenant = %tenant, error = %e, "Data planning failed");
                return InsightAnswer::message(format!("An unexpected error occurred: {e}"));
            }
        };

        match self.generator.generate(&answer_prompt(question, &data_json)).await {
            Ok(text) => {
                let text = text.trim();
                info!(tenant = %tenant, response = %text, "Answer generator raw response");
                parse_answer(text)
            }
            Err(e) => {
                error!(tenant = %tenant, error = %e, "Insight generation failed");
                InsightAnswer::message(format!("AI service error during insight generation: {e}"))
            }
        }
    }

    /// Plan and fetch; `Ok(None)` when the planner gave no JSON at all
    async fn gather(&self, question: &str, tenant: &TenantId) -> Result<Option<String>> {
        let planned = self.planner.plan(&planner_prompt(question)).await?;
        let planned = planned.trim();
        info!(tenant = %tenant, response = %planned, "Data planner raw response");

        let Some(block) = extract_json_block(planned) else {
            error!(tenant = %tenant, "Data planner did not return a JSON block");
            return Ok(None);
        };
        let plan: Value = serde_json::from_str(block)?;
        let params = plan
            .get("data_parameters")
            .map(ParameterSet::from_json)
            .unwrap_or_default();

        if params.is_empty() {
            info!(tenant = %tenant, "Planner returned empty data_parameters");
            return Ok(Some(
                json!({
                    "status": "no_params",
                    "message": "No specific data parameters identified for this query."
                })
                .to_string(),
            ));
        }

        let rows = self.service.fetch_for_analysis(&params, tenant);
        if rows.is_empty() {
            warn!(tenant = %tenant, "No sales data retrieved for planned parameters");
            return Ok(Some(
                json!({
                    "status": "no_data_found",
                    "message": "No relevant sales data found for your query based on current data."
                })
                .to_string(),
            ));
        }
        Ok(Some(serde_json::to_string(&rows)?))
    }
}

fn parse_answer(text: &str) -> InsightAnswer {
    let Some(block) = extract_json_block(text) else {
        warn!("Answer generator response did not contain a JSON block. Using full text as answer.");
        return InsightAnswer::message(text);
    };

    let parsed: Value = match serde_json::from_str(block) {
        Ok(parsed) => parsed,
        Err(e) => {
            warn!(error = %e, "Answer generator JSON block did not parse. Using full text as answer.");
            return InsightAnswer::message(text);
        }
    };

    let full_answer = parsed
        .get("insight")
        .and_then(Value::as_str)
        .unwrap_or(NO_INSIGHT_MESSAGE)
        .to_string();
    let chart = parsed
        .get("chart")
        .cloned()
        .and_then(|chart| serde_json::from_value(chart).ok())
        .unwrap_or_default();

    InsightAnswer { full_answer, chart }
}
