//! Property and scenario tests for the promotion engine.

use proptest::prelude::*;
use storefront_api::services::commerce::promotion::{
    CartLine, MultiBuyRule, PromotionEngine, PromotionSettings, ShippingPolicy,
};

const FEE: i64 = 500;

fn engine(cap: u32) -> PromotionEngine {
    PromotionEngine::new(PromotionSettings {
        name: "MULTI_BUY".to_string(),
        rules: vec![
            MultiBuyRule {
                product_id: "A".to_string(),
                group_size: 3,
                free_per_group: 1,
            },
            MultiBuyRule {
                product_id: "B".to_string(),
                group_size: 2,
                free_per_group: 1,
            },
        ],
        max_free_items_per_order: cap,
        shipping: ShippingPolicy {
            fee_amount: FEE,
            free_threshold_quantity: 3,
            exempt_products: vec!["SOCKS".to_string()],
        },
    })
}

fn line_strategy() -> impl Strategy<Value = CartLine> {
    (
        prop::sample::select(vec!["A", "B", "C", "SOCKS"]),
        0i64..10_000,
        0u32..12,
    )
        .prop_map(|(product, unit_amount, quantity)| CartLine {
            product_id: product.to_string(),
            unit_amount,
            quantity,
            display_name: format!("Product {product}"),
            image: None,
        })
}

fn cart_strategy() -> impl Strategy<Value = Vec<CartLine>> {
    prop::collection::vec(line_strategy(), 0..6)
}

proptest! {
    /// Every unit of the cart ends up either paid or free, never dropped
    /// and never duplicated, and the global cap holds.
    #[test]
    fn conservation_and_cap(cart in cart_strategy(), cap in 0u32..8) {
        let result = engine(cap).apply(&cart);

        let input_total: u32 = cart.iter().map(|l| l.quantity).sum();
        let output_total: u32 = result
            .lines
            .iter()
            .map(|l| l.pay_quantity + l.free_quantity)
            .sum();
        prop_assert_eq!(input_total, output_total);

        for priced in &result.lines {
            prop_assert_eq!(
                priced.pay_quantity + priced.free_quantity,
                cart[priced.source_line].quantity
            );
        }

        prop_assert!(result.free_items_applied <= cap);
        prop_assert!(result.shipping_amount == 0 || result.shipping_amount == FEE);
    }

    /// The engine prices the checkout and the preview; both runs must agree.
    #[test]
    fn repeated_runs_are_identical(cart in cart_strategy(), cap in 0u32..8) {
        let engine = engine(cap);
        prop_assert_eq!(engine.apply(&cart), engine.apply(&cart));
    }

    /// Shipping tier depends only on counted payable quantity.
    #[test]
    fn shipping_tier_matches_payable_quantity(cart in cart_strategy(), cap in 0u32..8) {
        let result = engine(cap).apply(&cart);
        let counted_payable: u32 = result
            .lines
            .iter()
            .filter(|l| l.product_id != "SOCKS")
            .map(|l| l.pay_quantity)
            .sum();
        let expected = if counted_payable >= 3 { 0 } else { FEE };
        prop_assert_eq!(result.shipping_amount, expected);
    }
}

#[test]
fn buy_three_pay_two_scenario() {
    // Three units at 1000: pay two, one free, two payable units still pay
    // the shipping fee, so the chargeable total is 2000 + 500.
    let cart = [CartLine {
        product_id: "A".to_string(),
        unit_amount: 1000,
        quantity: 3,
        display_name: "Classic Tee".to_string(),
        image: None,
    }];
    let result = engine(10).apply(&cart);

    assert_eq!(result.lines.len(), 1);
    assert_eq!(result.lines[0].pay_quantity, 2);
    assert_eq!(result.lines[0].free_quantity, 1);
    assert_eq!(result.free_items_applied, 1);
    assert_eq!(result.shipping_amount, FEE);
    assert_eq!(result.charged_lines_amount() + result.shipping_amount, 2500);
}

#[test]
fn shipping_tier_boundaries() {
    let make_line = |qty: u32| {
        [CartLine {
            product_id: "C".to_string(),
            unit_amount: 1000,
            quantity: qty,
            display_name: "Widget".to_string(),
            image: None,
        }]
    };

    assert_eq!(engine(10).apply(&make_line(2)).shipping_amount, FEE);
    assert_eq!(engine(10).apply(&make_line(3)).shipping_amount, 0);
}

#[test]
fn free_units_do_not_count_toward_free_shipping() {
    // Buy-2-get-1 on "B": 4 raw units become 2 paid + 2 free. Two payable
    // units sit below the threshold even though the parcel holds four.
    let cart = [CartLine {
        product_id: "B".to_string(),
        unit_amount: 800,
        quantity: 4,
        display_name: "Mug".to_string(),
        image: None,
    }];
    let result = engine(10).apply(&cart);

    assert_eq!(result.lines[0].pay_quantity, 2);
    assert_eq!(result.lines[0].free_quantity, 2);
    assert_eq!(result.shipping_amount, FEE);
}
