//! In-memory business metrics.
//!
//! Counters are plain atomics behind `Arc`, labelled counters live in a
//! `DashMap`. The registry is injected where it is needed rather than held
//! in a module-level global, and exported as JSON at `/metrics`.

use dashmap::DashMap;
use serde_json::json;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::info;

#[derive(Debug, Clone, Default)]
pub struct Counter {
    value: Arc<AtomicU64>,
}

impl Counter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inc(&self) {
        self.value.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }
}

/// Registry of the storefront's order counters.
#[derive(Debug, Default)]
pub struct MetricsRegistry {
    orders_created: Counter,
    orders_paid: Counter,
    orders_payment_failed: Counter,
    shipping_countries: DashMap<String, Counter>,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_order_created(&self) {
        self.orders_created.inc();
    }

    /// Called once per order, gated by the first transition to paid.
    pub fn record_order_paid(&self, shipping_country: Option<&str>) {
        self.orders_paid.inc();
        if let Some(country) = shipping_country.filter(|c| !c.trim().is_empty()) {
            let entry = self.shipping_countries.entry(country.to_string());
            match entry {
                dashmap::mapref::entry::Entry::Vacant(vacant) => {
                    info!(country = %country, "possible new shipping country");
                    let counter = Counter::new();
                    counter.inc();
                    vacant.insert(counter);
                }
                dashmap::mapref::entry::Entry::Occupied(occupied) => {
                    occupied.get().inc();
                }
            }
        }
    }

    pub fn record_payment_failed(&self) {
        self.orders_payment_failed.inc();
    }

    pub fn orders_paid_total(&self) -> u64 {
        self.orders_paid.get()
    }

    pub fn orders_created_total(&self) -> u64 {
        self.orders_created.get()
    }

    pub fn payment_failed_total(&self) -> u64 {
        self.orders_payment_failed.get()
    }

    pub fn shipping_country_total(&self, country: &str) -> u64 {
        self.shipping_countries
            .get(country)
            .map(|c| c.get())
            .unwrap_or(0)
    }

    pub fn snapshot(&self) -> serde_json::Value {
        let countries: serde_json::Map<String, serde_json::Value> = self
            .shipping_countries
            .iter()
            .map(|entry| (entry.key().clone(), json!(entry.value().get())))
            .collect();

        json!({
            "orders_created_total": self.orders_created.get(),
            "orders_paid_total": self.orders_paid.get(),
            "orders_payment_failed_total": self.orders_payment_failed.get(),
            "orders_paid_by_country": countries,
        })
    }
}
