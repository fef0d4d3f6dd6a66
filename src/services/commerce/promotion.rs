//! Cart pricing: multi-buy free-item allocation and tiered shipping.
//!
//! The engine is pure and deterministic. It runs twice for every order,
//! once to build the charged line items and once to price the storefront
//! preview, and the two results have to match exactly, so allocation walks
//! the lines in input order and touches no I/O or shared state.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

/// One shopper-contributed cart entry. Amounts are integer minor currency
/// units; lines are never merged, duplicates price independently.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CartLine {
    pub product_id: String,
    pub unit_amount: i64,
    pub quantity: u32,
    pub display_name: String,
    #[serde(default)]
    pub image: Option<String>,
}

/// "Buy `group_size`, get `free_per_group` of them free" for one product.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct MultiBuyRule {
    pub product_id: String,
    #[validate(range(min = 1))]
    pub group_size: u32,
    #[validate(range(min = 1))]
    pub free_per_group: u32,
}

/// Shipping fee policy, tiered on payable quantity.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ShippingPolicy {
    /// Flat fee charged below the free-shipping threshold.
    pub fee_amount: i64,
    /// Orders with at least this many counted payable units ship free.
    #[validate(range(min = 1))]
    pub free_threshold_quantity: u32,
    /// Products that never count toward the payable shipping quantity.
    /// Policy data, owned by product management.
    #[serde(default)]
    pub exempt_products: Vec<String>,
}

impl Default for ShippingPolicy {
    fn default() -> Self {
        Self {
            fee_amount: 500,
            free_threshold_quantity: 3,
            exempt_products: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct PromotionSettings {
    /// Name reported on orders the promotion actually touched.
    pub name: String,
    #[serde(default)]
    #[validate]
    pub rules: Vec<MultiBuyRule>,
    /// Global cap on free units per order, across all lines.
    pub max_free_items_per_order: u32,
    #[serde(default)]
    #[validate]
    pub shipping: ShippingPolicy,
}

impl Default for PromotionSettings {
    fn default() -> Self {
        Self {
            name: "NONE".to_string(),
            rules: Vec::new(),
            max_free_items_per_order: 10,
            shipping: ShippingPolicy::default(),
        }
    }
}

/// Reported when no promotion affected the order.
pub const NO_PROMOTION: &str = "NONE";

/// Per-line allocation of paid vs. free units.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct PricedLine {
    /// Index of the originating line in the input cart.
    pub source_line: usize,
    pub product_id: String,
    pub unit_amount: i64,
    pub pay_quantity: u32,
    pub free_quantity: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct PromotionResult {
    pub lines: Vec<PricedLine>,
    pub shipping_amount: i64,
    pub promotion_name: String,
    pub free_items_applied: u32,
}

impl PromotionResult {
    /// Sum of charged line values, before shipping.
    pub fn charged_lines_amount(&self) -> i64 {
        self.lines
            .iter()
            .map(|l| l.unit_amount * i64::from(l.pay_quantity))
            .sum()
    }
}

#[derive(Debug, Clone)]
pub struct PromotionEngine {
    settings: PromotionSettings,
}

impl PromotionEngine {
    pub fn new(settings: PromotionSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &PromotionSettings {
        &self.settings
    }

    pub fn max_free_items(&self) -> u32 {
        self.settings.max_free_items_per_order
    }

    /// Price a cart. Zero-quantity lines are skipped; everything else comes
    /// back as exactly one [`PricedLine`] with
    /// `pay_quantity + free_quantity == quantity`.
    pub fn apply(&self, lines: &[CartLine]) -> PromotionResult {
        let mut free_budget = self.settings.max_free_items_per_order;
        let mut priced = Vec::with_capacity(lines.len());

        for (index, line) in lines.iter().enumerate() {
            if line.quantity == 0 {
                continue;
            }

            let eligible = self
                .rule_for(&line.product_id)
                .map(|rule| (line.quantity / rule.group_size) * rule.free_per_group)
                .unwrap_or(0);
            // Cap is global: whatever the budget no longer covers is charged.
            let free = eligible.min(free_budget).min(line.quantity);
            free_budget -= free;

            priced.push(PricedLine {
                source_line: index,
                product_id: line.product_id.clone(),
                unit_amount: line.unit_amount,
                pay_quantity: line.quantity - free,
                free_quantity: free,
            });
        }

        let free_items_applied = self.settings.max_free_items_per_order - free_budget;
        let promotion_name = if free_items_applied > 0 {
            self.settings.name.clone()
        } else {
            NO_PROMOTION.to_string()
        };

        PromotionResult {
            shipping_amount: self.shipping_amount(&priced),
            lines: priced,
            promotion_name,
            free_items_applied,
        }
    }

    fn rule_for(&self, product_id: &str) -> Option<&MultiBuyRule> {
        self.settings
            .rules
            .iter()
            .find(|rule| rule.product_id == product_id && rule.group_size > 0)
    }

    /// Tier on payable quantity, not raw cart quantity: free gifts do not
    /// earn free shipping, and exempt products never count.
    fn shipping_amount(&self, priced: &[PricedLine]) -> i64 {
        let policy = &self.settings.shipping;
        let counted_payable: u32 = priced
            .iter()
            .filter(|l| !policy.exempt_products.contains(&l.product_id))
            .map(|l| l.pay_quantity)
            .sum();

        if counted_payable >= policy.free_threshold_quantity {
            0
        } else {
            policy.fee_amount
        }
    }
}
