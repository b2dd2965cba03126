use std::sync::Arc;

use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

use pedido_core::domain::order::LineItem;

use crate::llm::{json_payload, LlmClient};

const EXTRACT_PROMPT: &str = "You extract an order from a customer's message \
for a food ordering service. Respond with a single JSON object and nothing \
else:\n\
{\"items\": [{\"name\": \"...\", \"quantity\": <positive integer>, \"price\": <number, optional>}], \
\"special_instructions\": \"...\" (optional)}\n\
Only include items the customer clearly asked for. If no items are \
recognizable, return an empty items list.";

/// Candidate order parsed from one message. Transient; nothing here has been
/// validated against a catalog or persisted.
#[derive(Clone, Debug, PartialEq)]
pub struct ExtractionResult {
    pub items: Vec<LineItem>,
    pub special_instructions: Option<String>,
    pub requires_clarification: bool,
}

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("language model call failed: {0}")]
    Completion(String),
    #[error("model response was not usable: {0}")]
    MalformedModelResponse(String),
}

pub struct Extractor {
    llm: Arc<dyn LlmClient>,
}

impl Extractor {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm }
    }

    pub async fn extract(&self, text: &str) -> Result<ExtractionResult, ExtractError> {
        let prompt = format!("{EXTRACT_PROMPT}\n\nMessage: {text}");
        let raw = self
            .llm
            .complete(&prompt)
            .await
            .map_err(|error| ExtractError::Completion(error.to_string()))?;
        decode_extraction(&raw)
    }
}

#[derive(Deserialize)]
struct RawExtraction {
    #[serde(default)]
    items: Vec<RawItem>,
    #[serde(default)]
    special_instructions: Option<String>,
}

#[derive(Deserialize)]
struct RawItem {
    name: String,
    quantity: Value,
    #[serde(default)]
    price: Option<Value>,
}

fn decode_extraction(raw: &str) -> Result<ExtractionResult, ExtractError> {
    let payload = json_payload(raw);
    let decoded: RawExtraction = serde_json::from_str(payload)
        .map_err(|error| ExtractError::MalformedModelResponse(error.to_string()))?;

    let mut items = Vec::with_capacity(decoded.items.len());
    for item in decoded.items {
        let quantity = coerce_quantity(&item.quantity).ok_or_else(|| {
            ExtractError::MalformedModelResponse(format!(
                "item `{}` has unusable quantity {}",
                item.name, item.quantity
            ))
        })?;
        let unit_price = item
            .price
            .as_ref()
            .map(|price| {
                coerce_price(price).ok_or_else(|| {
                    ExtractError::MalformedModelResponse(format!(
                        "item `{}` has unusable price {price}",
                        item.name
                    ))
                })
            })
            .transpose()?;

        items.push(LineItem {
            name: item.name,
            quantity,
            unit_price,
            special_instructions: None,
        });
    }

    let requires_clarification = items.is_empty();
    Ok(ExtractionResult {
        items,
        special_instructions: decoded
            .special_instructions
            .filter(|instructions| !instructions.trim().is_empty()),
        requires_clarification,
    })
}

/// Models emit quantities as numbers or numeric strings; both must coerce to
/// a positive integer.
fn coerce_quantity(value: &Value) -> Option<u32> {
    let quantity = match value {
        Value::Number(number) => {
            if let Some(integer) = number.as_u64() {
                u32::try_from(integer).ok()?
            } else {
                let float = number.as_f64()?;
                if float.fract() != 0.0 || float < 0.0 || float > f64::from(u32::MAX) {
                    return None;
                }
                float as u32
            }
        }
        Value::String(text) => text.trim().parse::<u32>().ok()?,
        _ => return None,
    };
    (quantity > 0).then_some(quantity)
}

fn coerce_price(value: &Value) -> Option<Decimal> {
    let price = match value {
        Value::Number(number) => number.to_string().parse::<Decimal>().ok()?,
        Value::String(text) => text.trim().trim_start_matches('$').parse::<Decimal>().ok()?,
        Value::Null => return None,
        _ => return None,
    };
    (price >= Decimal::ZERO).then_some(price)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use rust_decimal::Decimal;

    use crate::llm::ScriptedLlmClient;

    use super::{ExtractError, Extractor};

    fn extractor(responses: Vec<&str>) -> Extractor {
        Extractor::new(Arc::new(ScriptedLlmClient::replying(responses)))
    }

    #[tokio::test]
    async fn extracts_items_with_quantities_and_prices() {
        let extractor = extractor(vec![
            r#"{"items": [{"name": "pizza", "quantity": 2, "price": 12.5}, {"name": "soda", "quantity": 1}], "special_instructions": "no ice"}"#,
        ]);
        let result = extractor.extract("2 pizzas and a soda, no ice").await.unwrap();

        assert_eq!(result.items.len(), 2);
        assert_eq!(result.items[0].name, "pizza");
        assert_eq!(result.items[0].quantity, 2);
        assert_eq!(result.items[0].unit_price, Some(Decimal::new(125, 1)));
        assert_eq!(result.items[1].unit_price, None);
        assert_eq!(result.special_instructions.as_deref(), Some("no ice"));
        assert!(!result.requires_clarification);
    }

    #[tokio::test]
    async fn coerces_string_quantities() {
        let extractor = extractor(vec![r#"{"items": [{"name": "taco", "quantity": "3"}]}"#]);
        let result = extractor.extract("three tacos").await.unwrap();
        assert_eq!(result.items[0].quantity, 3);
    }

    #[tokio::test]
    async fn empty_items_is_valid_and_requires_clarification() {
        let extractor = extractor(vec![r#"{"items": []}"#]);
        let result = extractor.extract("something to eat I guess").await.unwrap();
        assert!(result.items.is_empty());
        assert!(result.requires_clarification);
    }

    #[tokio::test]
    async fn zero_quantity_is_malformed() {
        let extractor = extractor(vec![r#"{"items": [{"name": "pizza", "quantity": 0}]}"#]);
        let error = extractor.extract("text").await.unwrap_err();
        assert!(matches!(error, ExtractError::MalformedModelResponse(_)));
    }

    #[tokio::test]
    async fn negative_quantity_is_malformed() {
        let extractor = extractor(vec![r#"{"items": [{"name": "pizza", "quantity": -2}]}"#]);
        let error = extractor.extract("text").await.unwrap_err();
        assert!(matches!(error, ExtractError::MalformedModelResponse(_)));
    }

    #[tokio::test]
    async fn oversized_float_quantity_is_malformed() {
        // 5e9 parses as an integral f64; it must not saturate to u32::MAX.
        let extractor = extractor(vec![r#"{"items": [{"name": "pizza", "quantity": 5e9}]}"#]);
        let error = extractor.extract("text").await.unwrap_err();
        assert!(matches!(error, ExtractError::MalformedModelResponse(_)));
    }

    #[tokio::test]
    async fn negative_price_is_malformed() {
        let extractor =
            extractor(vec![r#"{"items": [{"name": "pizza", "quantity": 1, "price": -4.0}]}"#]);
        let error = extractor.extract("text").await.unwrap_err();
        assert!(matches!(error, ExtractError::MalformedModelResponse(_)));
    }

    #[tokio::test]
    async fn non_json_response_is_malformed() {
        let extractor = extractor(vec!["They want pizza."]);
        let error = extractor.extract("text").await.unwrap_err();
        assert!(matches!(error, ExtractError::MalformedModelResponse(_)));
    }

    #[tokio::test]
    async fn blank_special_instructions_are_dropped() {
        let extractor = extractor(vec![
            r#"{"items": [{"name": "pizza", "quantity": 1}], "special_instructions": "  "}"#,
        ]);
        let result = extractor.extract("a pizza").await.unwrap();
        assert_eq!(result.special_instructions, None);
    }
}
