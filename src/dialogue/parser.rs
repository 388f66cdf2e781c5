//! Order intent parser: a bounded "<quantity> <product>" pattern match.

use regex::Regex;
use rust_decimal::Decimal;
use tracing::warn;

use crate::store::Product;

/// A product and quantity extracted from one message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderIntent {
    pub product_id: i64,
    pub product_name: String,
    /// Always greater than zero.
    pub quantity: u32,
    pub unit_price: Decimal,
}

impl OrderIntent {
    pub fn total(&self) -> Decimal {
        self.unit_price * Decimal::from(self.quantity)
    }
}

/// Match `text` against `catalog`.
///
/// Products are tried in catalog order and the first one whose pattern
/// matches wins, even if a later product is a more specific mention.
/// The pattern is a leading integer followed by the product name, or by
/// "par de"/"pares de" and the product name. Mentions with a zero or
/// out-of-range quantity are skipped in favour of later ones.
pub fn parse_order(text: &str, catalog: &[Product]) -> Option<OrderIntent> {
    let text = text.to_lowercase();

    for product in catalog {
        let Some(pattern) = product_pattern(&product.name) else {
            continue;
        };
        let Some(quantity) = first_quantity(&pattern, &text) else {
            continue;
        };

        return Some(OrderIntent {
            product_id: product.id,
            product_name: product.name.clone(),
            quantity,
            unit_price: product.price,
        });
    }

    None
}

/// First mention of the product with a usable quantity.
fn first_quantity(pattern: &Regex, text: &str) -> Option<u32> {
    let mut start = 0;
    while let Some(caps) = pattern.captures_at(text, start) {
        let digits = caps.get(1)?;
        match digits.as_str().parse::<u32>() {
            Ok(quantity) if quantity > 0 => return Some(quantity),
            _ => start = digits.end(),
        }
    }
    None
}

fn product_pattern(name: &str) -> Option<Regex> {
    let name = regex::escape(name.trim().to_lowercase().as_str());
    if name.is_empty() {
        return None;
    }
    let source = format!(r"(?:^|\s)(\d+)\s+(?:pares?\s+de\s+)?{name}(?:\W|$)");
    match Regex::new(&source) {
        Ok(re) => Some(re),
        Err(e) => {
            warn!(product = %name, error = %e, "Could not build product pattern");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn catalog() -> Vec<Product> {
        vec![
            Product {
                id: 1,
                name: "gafas".into(),
                price: dec!(50),
            },
            Product {
                id: 2,
                name: "lentillas".into(),
                price: dec!(20),
            },
            Product {
                id: 3,
                name: "gafas de sol".into(),
                price: dec!(80),
            },
        ]
    }

    #[test]
    fn quantity_and_product() {
        let intent = parse_order("2 gafas", &catalog()).unwrap();
        assert_eq!(intent.product_id, 1);
        assert_eq!(intent.product_name, "gafas");
        assert_eq!(intent.quantity, 2);
        assert_eq!(intent.unit_price, dec!(50));
        assert_eq!(intent.total(), dec!(100));
    }

    #[test]
    fn case_folded() {
        let intent = parse_order("Quiero 3 LENTILLAS por favor", &catalog()).unwrap();
        assert_eq!(intent.product_id, 2);
        assert_eq!(intent.quantity, 3);
    }

    #[test]
    fn pares_de_form() {
        let intent = parse_order("quiero 2 pares de lentillas", &catalog()).unwrap();
        assert_eq!(intent.product_id, 2);
        assert_eq!(intent.quantity, 2);

        let intent = parse_order("1 par de gafas", &catalog()).unwrap();
        assert_eq!(intent.product_id, 1);
        assert_eq!(intent.quantity, 1);
    }

    #[test]
    fn first_match_wins_over_more_specific() {
        // "gafas de sol" is listed after "gafas", so "gafas" wins.
        let intent = parse_order("4 gafas de sol", &catalog()).unwrap();
        assert_eq!(intent.product_id, 1);
        assert_eq!(intent.quantity, 4);
    }

    #[test]
    fn two_products_resolve_to_catalog_order() {
        let intent = parse_order("1 lentillas y 2 gafas", &catalog()).unwrap();
        assert_eq!(intent.product_id, 1);
        assert_eq!(intent.quantity, 2);
    }

    #[test]
    fn no_match() {
        assert!(parse_order("asdf", &catalog()).is_none());
        assert!(parse_order("gafas", &catalog()).is_none());
        assert!(parse_order("dos gafas", &catalog()).is_none());
        assert!(parse_order("2 monturas", &catalog()).is_none());
    }

    #[test]
    fn zero_quantity_rejected() {
        assert!(parse_order("0 gafas", &catalog()).is_none());
    }

    #[test]
    fn zero_quantity_falls_through_to_later_mention() {
        let intent = parse_order("0 gafas no, mejor 2 gafas", &catalog()).unwrap();
        assert_eq!(intent.product_id, 1);
        assert_eq!(intent.quantity, 2);

        let intent = parse_order("0 gafas 3 gafas", &catalog()).unwrap();
        assert_eq!(intent.quantity, 3);
    }

    #[test]
    fn overflowing_quantity_falls_through_to_later_mention() {
        let text = "99999999999999 lentillas, perdón, 1 lentillas";
        let intent = parse_order(text, &catalog()).unwrap();
        assert_eq!(intent.product_id, 2);
        assert_eq!(intent.quantity, 1);
    }

    #[test]
    fn quantity_overflow_rejected() {
        assert!(parse_order("99999999999999 gafas", &catalog()).is_none());
    }

    #[test]
    fn digits_inside_words_do_not_count() {
        assert!(parse_order("ref12 gafas", &catalog()).is_none());
    }

    #[test]
    fn empty_catalog() {
        assert!(parse_order("2 gafas", &[]).is_none());
    }

    #[test]
    fn product_names_are_literal() {
        let catalog = vec![Product {
            id: 9,
            name: "lentes (x2)".into(),
            price: dec!(10),
        }];
        let intent = parse_order("5 lentes (x2)", &catalog).unwrap();
        assert_eq!(intent.quantity, 5);
        assert!(parse_order("5 lentes x2", &catalog).is_none());
    }
}
