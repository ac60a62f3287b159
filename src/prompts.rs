//! Prompts for the two-step insight flow
//!
//! The planner turns a question into `data_parameters`; the answer generator
//! turns fetched rows into an insight plus a chart description.

use crate::store::LEDGER_TABLE;

/// Schema description of a tenant ledger as shown to the planner
pub fn ledger_schema_description() -> String {
    format!(
        r#"Table Name: {LEDGER_TABLE}

Columns:
- item (TEXT): The name of the product.
- price (REAL): The price of a single item.
- quantity_in_stock (INTEGER): The current quantity of the item available in stock.
- quantity_sold (INTEGER): The number of units of the item sold in a transaction.
- sale_date (TEXT, format YYYY-MM-DD): The date when the sale occurred."#
    )
}

const PARAMETER_SHAPE: &str = r#"{
  "x_axis": "column_name_for_x_axis",
  "y_axis": "column_name_for_y_axis or total_sales",
  "aggregation": "sum" | "count" | "average" | "none",
  "filter_column": "column_name_to_filter",
  "filter_value": "value_to_filter_by",
  "sort_by": "column_name_to_sort",
  "sort_order": "asc" | "desc",
  "limit": 5,
  "time_period": "this_month" | "last_month" | "this_quarter" | "last_quarter" | "ytd" | "all_time" | "YYYY-MM-DD to YYYY-MM-DD"
}"#;

pub fn planner_prompt(question: &str) -> String {
    format!(
        r#"You are a data analyst assistant for a small retail shop. Identify the exact data needed from the database to answer the user's question.

OUTPUT: a single JSON object, no other text, with a key "data_parameters" shaped like:
{PARAMETER_SHAPE}

RULES:
- Only include parameters the question needs. Omit aggregation and filters when none are implied.
- Use y_axis "total_sales" for revenue (price * quantity_sold).
- Infer time_period from the question.
- If no specific data retrieval applies, return an empty "data_parameters" object.

DATABASE SCHEMA:
{schema}

User Question: {question}"#,
        schema = ledger_schema_description(),
    )
}

pub fn answer_prompt(question: &str, data_json: &str) -> String {
    format!(
        r#"You are a data analyst and business consultant for small retail shops in Nepal. Analyze the sales data below and answer the question with an executive-level insight and a chart description.

If the question is asked in Nepali, reply in Nepali for the "insight" field. Keep small-business context in mind.

OUTPUT: a single JSON object, no other text:
{{
  "insight": "textual insight",
  "chart": {{
    "type": "none" | "bar_chart" | "line_chart" | "pie_chart",
    "data_parameters": {PARAMETER_SHAPE}
  }}
}}

Set "chart.type" to "none" when no visualization applies or data is insufficient. For pie_chart, x_axis is the category and y_axis the value.

SALES DATA:
{data_json}

Question: {question}"#
    )
}
