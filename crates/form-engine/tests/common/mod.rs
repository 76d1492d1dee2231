#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use form_engine::{
    CollectionRules, FormBuilder, FormConfiguration, InMemoryProvider, LovColumn, LovConfig,
    LovQuery, LovSource, accessor,
    error::LovError,
    lov::{LovDataProvider, LovDataResult},
};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Address {
    pub street: String,
    pub city: String,
    pub zip_code: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct OrderLine {
    pub product_name: String,
    pub quantity: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Order {
    pub customer: String,
    pub email: String,
    pub express: bool,
    pub total: f64,
    pub country: String,
    pub currency: String,
    pub state: String,
    pub state_name: String,
    pub address: Address,
    pub lines: Vec<OrderLine>,
    pub tags: Vec<String>,
    pub card_number: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Country {
    pub code: &'static str,
    pub name: &'static str,
    pub currency: &'static str,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct State {
    pub code: &'static str,
    pub name: &'static str,
    pub country: &'static str,
}

pub fn countries() -> Vec<Country> {
    vec![
        Country { code: "DE", name: "Germany", currency: "EUR" },
        Country { code: "FR", name: "France", currency: "EUR" },
        Country { code: "GB", name: "United Kingdom", currency: "GBP" },
        Country { code: "CH", name: "Switzerland", currency: "CHF" },
        Country { code: "US", name: "United States", currency: "USD" },
    ]
}

pub fn states() -> Vec<State> {
    vec![
        State { code: "IDF", name: "Ile-de-France", country: "FR" },
        State { code: "BRE", name: "Bretagne", country: "FR" },
        State { code: "BY", name: "Bayern", country: "DE" },
        State { code: "BE", name: "Berlin", country: "DE" },
        State { code: "HH", name: "Hamburg", country: "DE" },
    ]
}

pub fn country_lov() -> LovConfig<Order, Country> {
    LovConfig::new(
        LovSource::provider(InMemoryProvider::new(countries())),
        |country: &Country| country.code.to_string(),
        |country: &Country| country.name.to_string(),
    )
    .column(LovColumn::new("code", "Code").width(80))
    .column(LovColumn::new("name", "Country"))
    .map_field(&accessor!(Order, currency), |country| {
        country.currency.to_string()
    })
}

/// Records every query it receives before answering from `states()`.
#[derive(Clone, Default)]
pub struct RecordingStates {
    pub seen: Arc<Mutex<Vec<LovQuery>>>,
}

impl RecordingStates {
    pub fn queries(&self) -> Vec<LovQuery> {
        self.seen.lock().expect("lock").clone()
    }
}

#[async_trait::async_trait]
impl LovDataProvider<State> for RecordingStates {
    async fn query(
        &self,
        query: &LovQuery,
        cancel: tokio_util::sync::CancellationToken,
    ) -> Result<LovDataResult<State>, LovError> {
        self.seen.lock().expect("lock").push(query.clone());
        InMemoryProvider::new(states())
            .match_context()
            .query(query, cancel)
            .await
    }
}

pub fn state_lov(provider: RecordingStates) -> LovConfig<Order, State> {
    LovConfig::new(
        LovSource::provider(provider),
        |state: &State| state.code.to_string(),
        |state: &State| state.name.to_string(),
    )
    .depends_on(&accessor!(Order, country), "country", true)
    .map_field(&accessor!(Order, state_name), |state| state.name.to_string())
}

pub fn order_line_form() -> FormConfiguration<OrderLine> {
    FormBuilder::new("order_line")
        .field(accessor!(OrderLine, product_name), |f| {
            f.label("Product").required_with("ProductName required")
        })
        .field(accessor!(OrderLine, quantity), |f| {
            f.label("Quantity").min_value(1.0)
        })
        .build()
        .expect("order line form")
}

pub fn lines_rules() -> CollectionRules<OrderLine> {
    CollectionRules::new().item_form(order_line_form())
}

pub fn order(customer: &str) -> Order {
    Order {
        customer: customer.to_string(),
        ..Order::default()
    }
}
