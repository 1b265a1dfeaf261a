use chrono::{DateTime, Utc};
use common::domain::{PriceChangeEvent, PriceSnapshot, ProductKind, WentFreeNotice};

/// Product types that can be bought, and so can go free.
const PURCHASABLE_TYPES: [&str; 2] = ["Game", "Package"];

/// The product a price table belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PricedProduct {
    pub id: u32,
    pub kind: ProductKind,
    pub name: String,
    pub icon: String,
    pub product_type: String,
}

/// One event per supported currency whose final price differs.
///
/// A currency is only compared when `after` carries it; a currency missing
/// from `before` compares against zero.
pub fn detect_price_delta(
    product: &PricedProduct,
    before: &PriceSnapshot,
    after: &PriceSnapshot,
    supported_currencies: &[String],
    created_at: DateTime<Utc>,
) -> Vec<PriceChangeEvent> {
    supported_currencies
        .iter()
        .filter_map(|currency| {
            let price_after = after.get(currency)?.final_price;
            let price_before = before.get(currency).map(|p| p.final_price).unwrap_or(0);
            if price_before == price_after {
                return None;
            }

            let difference = price_after.saturating_sub(price_before);
            Some(PriceChangeEvent {
                product_id: product.id,
                kind: product.kind,
                name: product.name.clone(),
                icon: product.icon.clone(),
                currency: currency.clone(),
                price_before,
                price_after,
                difference,
                difference_percent: difference_percent(price_before, difference),
                created_at,
            })
        })
        .collect()
}

fn difference_percent(price_before: i64, difference: i64) -> Option<f64> {
    if price_before == 0 {
        return None;
    }
    Some(difference as f64 / price_before as f64 * 100.0)
}

/// A purchasable product whose reference-currency price dropped to zero.
pub fn went_free(
    product: &PricedProduct,
    before: &PriceSnapshot,
    after: &PriceSnapshot,
    reference_currency: &str,
) -> Option<WentFreeNotice> {
    if !PURCHASABLE_TYPES.contains(&product.product_type.as_str()) {
        return None;
    }

    let price_after = after.get(reference_currency)?.final_price;
    let price_before = before
        .get(reference_currency)
        .map(|p| p.final_price)
        .unwrap_or(0);

    (price_before > 0 && price_after == 0).then(|| WentFreeNotice {
        kind: product.kind,
        id: product.id,
        name: product.name.clone(),
        currency: reference_currency.to_string(),
        price_before,
    })
}
