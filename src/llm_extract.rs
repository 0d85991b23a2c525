// src/llm_extract.rs

use crate::config::{LlmBackend, LlmSection};
use crate::error::ExtractError;
use crate::heuristics::{ExtractionResult, InvoiceHeader, LineItem};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Instructions plus one worked example of the expected JSON shape.
const SYSTEM_PROMPT: &str = r#"You are an invoice data extraction assistant.
Given raw text extracted from an Amazon-style Indian tax invoice PDF, extract structured data
and return ONLY strictly valid JSON with exactly two top-level keys:

{
  "invoice_info": {
    "order_number": "", "order_date": "", "invoice_number": "", "invoice_date": "",
    "invoice_details": "", "billing_name": "", "billing_address": "", "billing_gst": "",
    "shipping_name": "", "shipping_address": "", "shipping_gst": ""
  },
  "items": [
    {
      "sl_no": "", "description": "", "hsn_code": "", "unit_price": "", "discount": "",
      "qty": "", "net_amount": "", "tax_rate": "", "tax_type": "", "tax_amount": "",
      "total_amount": ""
    }
  ]
}

Field rules:
- order_number: value after "Order Number:". invoice_number: value after "Invoice Number :".
- order_date: value after "Order Date:". invoice_date: value after "Invoice Date :".
- invoice_details: value after "Invoice Details :".
- billing_name / billing_address: first line and remaining lines of the block after "Billing Address :".
- shipping_name / shipping_address: first line and remaining lines of the block after "Shipping Address :".
- Addresses are single strings with lines joined by ", ". Never include the GST line in an address.
- billing_gst / shipping_gst: value after "GST Registration No:" inside the respective block.
- description: product name only; drop ASIN, SKU and "HSN:" identifiers from it.
- hsn_code: the HSN code of the item.
- tax_type: e.g. "IGST", "CGST", "SGST". When an item carries two taxes (CGST and SGST), join
  them as "CGST, SGST" and join their rates and amounts the same way.

Number rules:
- Every value is a JSON string. Never emit JSON numbers.
- Remove currency symbols (₹, Rs.) and thousands separators: "₹1,299.00" becomes "1299.00".
- Keep negative signs: a discount of "-₹100.00" becomes "-100.00".
- Keep the percent sign on tax rates: "18%".

Shipping charges:
- A "Shipping Charges" row under an item is its own entry in "items" with an empty "sl_no",
  description "Shipping Charges", and its own amounts and taxes.

Use "" for anything you cannot find. If there are no items, return "items": [].
Return ONLY the JSON object, no markdown fences, no commentary.

Example input:
Order Number: 171-5544332-1122334 Invoice Number : BLR8-998877
Order Date: 05.11.2023 Invoice Details : KA-BLR8-1234-2324
Invoice Date : 05.11.2023
Billing Address :
Priya Nair
4th Cross, Indiranagar
BENGALURU, KARNATAKA, 560038
IN
Shipping Address :
Priya Nair
4th Cross, Indiranagar
BENGALURU, KARNATAKA, 560038
IN
1 Boat Rockerz 450 Headphones | B07PR1CL3S ( B07PR1CL3S ) HSN:85183000
₹1,270.34 -₹100.00 1 ₹1,170.34 9% CGST ₹105.33
9% SGST ₹105.33 ₹1,381.00
Shipping Charges ₹33.90 -₹33.90 ₹0.00 9% CGST ₹0.00
9% SGST ₹0.00 ₹0.00

Example output:
{"invoice_info":{"order_number":"171-5544332-1122334","order_date":"05.11.2023",
"invoice_number":"BLR8-998877","invoice_date":"05.11.2023","invoice_details":"KA-BLR8-1234-2324",
"billing_name":"Priya Nair","billing_address":"4th Cross, Indiranagar, BENGALURU, KARNATAKA, 560038, IN",
"billing_gst":"","shipping_name":"Priya Nair",
"shipping_address":"4th Cross, Indiranagar, BENGALURU, KARNATAKA, 560038, IN","shipping_gst":""},
"items":[{"sl_no":"1","description":"Boat Rockerz 450 Headphones","hsn_code":"85183000",
"unit_price":"1270.34","discount":"-100.00","qty":"1","net_amount":"1170.34","tax_rate":"9%, 9%",
"tax_type":"CGST, SGST","tax_amount":"105.33, 105.33","total_amount":"1381.00"},
{"sl_no":"","description":"Shipping Charges","hsn_code":"","unit_price":"33.90","discount":"-33.90",
"qty":"","net_amount":"0.00","tax_rate":"9%, 9%","tax_type":"CGST, SGST","tax_amount":"0.00, 0.00",
"total_amount":"0.00"}]}"#;

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f64,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

/// The JSON document the model is asked to produce.
#[derive(Debug, Deserialize)]
struct CompletionPayload {
    #[serde(default)]
    invoice_info: Option<InvoiceHeader>,
    #[serde(default)]
    items: Option<Vec<LineItem>>,
}

/// Resolved endpoint configuration ready to make API calls.
#[derive(Debug, Clone)]
struct ResolvedEndpoint {
    base_url: String,
    model: String,
    api_key: String,
}

/// Resolve the LLM config section into a concrete endpoint.
fn resolve_endpoint(
    llm: &LlmSection,
    api_key: Option<String>,
) -> Result<ResolvedEndpoint, ExtractError> {
    match llm.backend {
        LlmBackend::Ollama => Ok(ResolvedEndpoint {
            base_url: llm.ollama.base_url.clone(),
            model: llm.ollama.model.clone(),
            api_key: "ollama".to_string(), // required by API but ignored
        }),
        LlmBackend::Remote => {
            let api_key = api_key.ok_or_else(|| {
                ExtractError::Config(format!(
                    "{} env var required for remote backend",
                    llm.remote.api_key_env
                ))
            })?;
            Ok(ResolvedEndpoint {
                base_url: llm.remote.base_url.clone(),
                model: llm.remote.model.clone(),
                api_key,
            })
        }
        LlmBackend::Pattern => Err(ExtractError::Config(
            "pattern backend selected, no completion service to call".to_string(),
        )),
    }
}

/// Extractor that hands the whole invoice to a chat-completion service.
pub struct LlmExtractor {
    client: Client,
    endpoint: ResolvedEndpoint,
    backend: LlmBackend,
    max_chars: usize,
}

impl LlmExtractor {
    /// Fails fast when the backend needs a credential that was not supplied.
    pub fn new(llm: &LlmSection, api_key: Option<String>) -> Result<Self, ExtractError> {
        let endpoint = resolve_endpoint(llm, api_key)?;
        let client = Client::builder()
            .timeout(Duration::from_secs(llm.timeout_secs))
            .build()
            .map_err(|e| ExtractError::Config(format!("Failed to build HTTP client: {e}")))?;

        info!(
            backend = ?llm.backend,
            url = %endpoint.base_url,
            model = %endpoint.model,
            timeout_secs = llm.timeout_secs,
            "Using completion service"
        );

        Ok(Self {
            client,
            endpoint,
            backend: llm.backend,
            max_chars: llm.max_chars,
        })
    }

    /// Check the local server is reachable. Remote backends always pass.
    pub async fn check_health(&self) -> Result<(), ExtractError> {
        if self.backend != LlmBackend::Ollama {
            return Ok(());
        }

        // Ollama's health endpoint is at the root (not under /v1)
        let health_url = self.endpoint.base_url.trim_end_matches('/').trim_end_matches("/v1");

        match self
            .client
            .get(health_url)
            .timeout(Duration::from_secs(3))
            .send()
            .await
        {
            Ok(resp) if resp.status().is_success() => {
                info!("Ollama server is reachable");
                Ok(())
            }
            Ok(resp) => Err(ExtractError::Config(format!(
                "Ollama at {health_url} returned {}",
                resp.status()
            ))),
            Err(e) => Err(ExtractError::Config(format!(
                "Ollama is not running at {health_url} ({e}). Start it with: ollama serve"
            ))),
        }
    }

    /// Send invoice text to the service and parse the structured reply.
    pub async fn extract(&self, extracted_text: &str) -> Result<ExtractionResult, ExtractError> {
        let text = truncate_chars(extracted_text, self.max_chars);
        if text.len() < extracted_text.len() {
            warn!(
                chars = self.max_chars,
                "Invoice text truncated before submission"
            );
        }

        let request = ChatRequest {
            model: self.endpoint.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: SYSTEM_PROMPT.to_string(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: format!("Extract invoice data from the following PDF text:\n\n{text}"),
                },
            ],
            temperature: 0.0,
        };

        let url = format!("{}/chat/completions", self.endpoint.base_url.trim_end_matches('/'));

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.endpoint.api_key))
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ExtractError::Service(format!("LLM API error {status}: {body}")));
        }

        let chat_response: ChatResponse = response.json().await?;
        let content = chat_response
            .choices
            .first()
            .map(|c| c.message.content.as_str())
            .ok_or_else(|| ExtractError::Service("Empty response from LLM".to_string()))?;

        parse_completion(content)
    }
}

/// Parse completion text into a result. Code fences and any text around the
/// outermost JSON object are discarded. A payload without items still yields
/// one empty item so the header reaches the sheet.
pub fn parse_completion(content: &str) -> Result<ExtractionResult, ExtractError> {
    let json_str = content
        .trim()
        .trim_start_matches("```json")
        .trim_start_matches("```JSON")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim();

    let json_str = extract_json_object(json_str)?;
    debug!(json_len = json_str.len(), "Parsing completion payload");

    let payload: CompletionPayload = serde_json::from_str(json_str)?;

    let mut items = payload.items.unwrap_or_default();
    if items.is_empty() {
        items.push(LineItem::default());
    }

    Ok(ExtractionResult {
        header: payload.invoice_info.unwrap_or_default(),
        items,
    })
}

/// Extract the outermost JSON object from a string that may contain
/// surrounding text (e.g. reasoning preambles).
fn extract_json_object(s: &str) -> Result<&str, ExtractError> {
    let start = s
        .find('{')
        .ok_or_else(|| ExtractError::Service("No '{' found in LLM response".to_string()))?;
    let end = s
        .rfind('}')
        .ok_or_else(|| ExtractError::Service("No '}' found in LLM response".to_string()))?;
    if end <= start {
        return Err(ExtractError::Service(
            "Malformed JSON in LLM response".to_string(),
        ));
    }
    Ok(&s[start..=end])
}

fn truncate_chars(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
