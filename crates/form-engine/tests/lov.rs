mod common;

use std::{
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use common::{Country, Order, RecordingStates, State, countries, country_lov, order, state_lov, states};
use form_engine::{
    ApplyOutcome, ConfigError, FilterDefinition, FnProvider, FormBuilder, FormConfiguration,
    FormSession, InMemoryProvider, LovBinding, LovConfig, LovController, LovDataProvider,
    LovDataResult, LovQuery, LovRegistry, LovSettings, LovSource, Services, SortDefinition,
    SortDirection, accessor, lov::QueryCompletion,
};
use futures::FutureExt;
use serde_json::json;
use tokio_util::sync::CancellationToken;

fn names(items: &[Country]) -> Vec<&'static str> {
    items.iter().map(|country| country.name).collect()
}

#[tokio::test]
async fn in_memory_provider_sorts_pages_and_filters() {
    let provider = InMemoryProvider::new(countries()).search_fields(["name"]);

    let query = LovQuery::new(0, 2).with_sort(SortDefinition::descending("name"));
    let page = provider
        .query(&query, CancellationToken::new())
        .await
        .expect("page");
    assert_eq!(names(&page.items), vec!["United States", "United Kingdom"]);
    assert_eq!(page.total_count, 5);

    let query = LovQuery::new(4, 2).with_sort(SortDefinition::descending("name"));
    let last = provider
        .query(&query, CancellationToken::new())
        .await
        .expect("last page");
    assert_eq!(names(&last.items), vec!["France"]);
    assert!(last.is_consistent(&query));

    let query = LovQuery::new(0, 10)
        .with_filter(FilterDefinition::equals("currency", "EUR"))
        .with_sort(SortDefinition::ascending("code"));
    let euro = provider
        .query(&query, CancellationToken::new())
        .await
        .expect("filtered");
    assert_eq!(names(&euro.items), vec!["Germany", "France"]);
    assert_eq!(euro.total_count, 2);

    let query = LovQuery::new(0, 10).with_search("KING");
    let searched = provider
        .query(&query, CancellationToken::new())
        .await
        .expect("searched");
    assert_eq!(names(&searched.items), vec!["United Kingdom"]);
}

#[tokio::test]
async fn context_matching_scopes_results() {
    let provider = InMemoryProvider::new(states()).match_context();
    let query = LovQuery::new(0, 10).with_context("country", "DE");
    let page = provider
        .query(&query, CancellationToken::new())
        .await
        .expect("page");
    assert_eq!(page.total_count, 3);
    assert!(page.items.iter().all(|state| state.country == "DE"));

    let cancelled = CancellationToken::new();
    cancelled.cancel();
    assert!(provider.query(&query, cancelled).await.is_err());
}

fn make_country_form(config: LovConfig<Order, Country>) -> FormConfiguration<Order> {
    FormBuilder::new("countries")
        .field(accessor!(Order, country), |f| f.label("Country").lov(config))
        .field(accessor!(Order, currency), |f| f.label("Currency"))
        .field(accessor!(Order, email), |f| f.label("Email"))
        .build()
        .expect("form")
}

fn controller(form: &FormConfiguration<Order>) -> LovController<Order, Country> {
    LovController::for_field(form, "country", LovSettings::default()).expect("controller")
}

#[tokio::test]
async fn controller_pages_through_results() {
    let form = make_country_form(country_lov().page_size(2));
    let services = Services::new();
    let model = Order::default();
    let mut lov = controller(&form);

    let pending = lov.open(&model);
    assert_eq!(pending.query().count, 2);
    assert!(lov.is_loading());
    assert_eq!(lov.apply(pending.run(&services).await), ApplyOutcome::Applied);
    assert!(!lov.is_loading());
    assert_eq!(lov.items().len(), 2);
    assert_eq!(lov.total_count(), 5);
    assert_eq!(lov.page_count(), 3);

    let pending = lov.page(2, &model);
    assert_eq!(pending.query().start_index, 4);
    lov.apply(pending.run(&services).await);
    assert_eq!(lov.page_index(), 2);
    assert_eq!(names(lov.items()), vec!["United States"]);

    let pending = lov.sort("name", SortDirection::Ascending, &model);
    lov.apply(pending.run(&services).await);
    assert_eq!(lov.page_index(), 0);
    assert_eq!(names(lov.items()), vec!["France", "Germany"]);

    let pending = lov.filter(vec![FilterDefinition::equals("currency", "EUR")], &model);
    lov.apply(pending.run(&services).await);
    assert_eq!(lov.total_count(), 2);
}

#[tokio::test]
async fn out_of_range_pages_are_empty() {
    let form = make_country_form(country_lov().page_size(2));
    let services = Services::new();
    let model = Order::default();
    let mut lov = controller(&form);

    let pending = lov.page(usize::MAX, &model);
    assert_eq!(pending.query().start_index, usize::MAX);
    assert_eq!(lov.apply(pending.run(&services).await), ApplyOutcome::Applied);
    assert!(lov.items().is_empty());
    assert_eq!(lov.total_count(), 5);
}

#[tokio::test]
async fn stale_results_are_discarded() {
    let form = make_country_form(country_lov().debounce_ms(0));
    let services = Services::new();
    let model = Order::default();
    let mut lov = controller(&form);

    let first = lov.open(&model);
    let stale = first.run(&services).await;
    assert!(stale.result.is_ok());

    let second = lov.search("germ", &model);
    assert_eq!(lov.apply(stale), ApplyOutcome::Superseded);
    assert!(lov.items().is_empty());

    assert_eq!(lov.apply(second.run(&services).await), ApplyOutcome::Applied);
    assert_eq!(names(lov.items()), vec!["Germany"]);
    assert_eq!(lov.search_text(), Some("germ"));
}

#[tokio::test]
async fn newer_queries_cancel_older_ones() {
    let form = make_country_form(country_lov().debounce_ms(0));
    let services = Services::new();
    let model = Order::default();
    let mut lov = controller(&form);

    let older = lov.search("fr", &model);
    let token = older.cancellation().clone();
    let newer = lov.search("ger", &model);
    assert!(token.is_cancelled());
    assert!(newer.generation() > older.generation());

    let completion: QueryCompletion<Country> = older.run(&services).await;
    assert!(completion.result.is_err());
    assert_eq!(lov.apply(completion), ApplyOutcome::Superseded);
    assert_eq!(lov.apply(newer.run(&services).await), ApplyOutcome::Applied);
    assert_eq!(names(lov.items()), vec!["Germany"]);
}

fn counting_provider(calls: Arc<AtomicUsize>) -> FnProvider<Country> {
    FnProvider::new(move |query: LovQuery, cancel: CancellationToken| {
        let calls = Arc::clone(&calls);
        async move {
            calls.fetch_add(1, Ordering::SeqCst);
            InMemoryProvider::new(countries()).query(&query, cancel).await
        }
        .boxed()
    })
}

#[tokio::test(start_paused = true)]
async fn searches_are_debounced() {
    let calls = Arc::new(AtomicUsize::new(0));
    let config = LovConfig::new(
        LovSource::provider(counting_provider(Arc::clone(&calls))),
        |country: &Country| country.code.to_string(),
        |country: &Country| country.name.to_string(),
    );
    let form = make_country_form(config);
    let services = Services::new();
    let model = Order::default();
    let mut lov = controller(&form);
    assert_eq!(lov.debounce(), Duration::from_millis(300));

    let started = tokio::time::Instant::now();
    let typed_g = lov.search("G", &model);
    let typed_ge = lov.search("Ge", &model);
    let typed_ger = lov.search("Ger", &model);
    let (g, ge, ger) = tokio::join!(
        typed_g.run(&services),
        typed_ge.run(&services),
        typed_ger.run(&services)
    );

    assert!(g.result.is_err());
    assert!(ge.result.is_err());
    assert_eq!(lov.apply(ger), ApplyOutcome::Applied);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(started.elapsed() >= Duration::from_millis(300));
    assert_eq!(names(lov.items()), vec!["Germany"]);
}

#[tokio::test]
async fn short_search_text_searches_nothing() {
    let form = make_country_form(country_lov().min_search_length(3).debounce_ms(0));
    let mut lov = controller(&form);
    let pending = lov.search("ge", &Order::default());
    assert_eq!(pending.query().search_text, None);
    let pending = lov.search("ger", &Order::default());
    assert_eq!(pending.query().search_text.as_deref(), Some("ger"));
}

#[tokio::test]
async fn inconsistent_pages_are_rejected() {
    let provider = FnProvider::<Country>::new(|_query: LovQuery, _cancel: CancellationToken| {
        async move { Ok(LovDataResult::new(countries(), 2)) }.boxed()
    });
    let config = LovConfig::new(
        LovSource::provider(provider),
        |country: &Country| country.code.to_string(),
        |country: &Country| country.name.to_string(),
    )
    .page_size(2);
    let form = make_country_form(config);
    let mut lov = controller(&form);

    let outcome = lov.refresh(&Order::default(), &Services::new()).await;
    assert!(matches!(outcome, ApplyOutcome::Failed(_)));
    assert!(lov.items().is_empty());
    assert!(lov.last_error().is_some());
}

#[tokio::test]
async fn named_providers_resolve_through_services() {
    let config = LovConfig::new(
        LovSource::named("countries"),
        |country: &Country| country.code.to_string(),
        |country: &Country| country.name.to_string(),
    );
    let form = make_country_form(config);
    let model = Order::default();
    let mut lov = controller(&form);
    assert_eq!(lov.config().provider_name(), Some("countries"));

    let missing = lov.refresh(&model, &Services::new()).await;
    assert_eq!(
        missing,
        ApplyOutcome::Failed("no data provider registered under 'countries'".into())
    );

    let services = Services::new().with(
        LovRegistry::<Country>::new().register("countries", InMemoryProvider::new(countries())),
    );
    assert_eq!(lov.refresh(&model, &services).await, ApplyOutcome::Applied);
    assert_eq!(lov.total_count(), 5);
    assert!(lov.last_error().is_none());
}

#[test]
fn lov_lookup_checks_field_and_item_type() {
    let form = make_country_form(country_lov());
    assert!(form.lov::<Country>("country").is_ok());
    assert!(matches!(
        form.lov::<State>("country"),
        Err(ConfigError::LovTypeMismatch(_))
    ));
    assert!(matches!(
        form.lov::<Country>("currency"),
        Err(ConfigError::LovTypeMismatch(_))
    ));
    assert!(matches!(
        form.lov::<Country>("nope"),
        Err(ConfigError::UnknownField(_))
    ));
    assert_eq!(form.lov_fields().count(), 1);
}

fn germany() -> Country {
    countries()
        .into_iter()
        .find(|country| country.code == "DE")
        .expect("germany")
}

#[tokio::test]
async fn selection_writes_the_field_and_every_mapping() {
    let config = country_lov().map_field(&accessor!(Order, email), |country: &Country| {
        format!("sales@{}.example", country.code.to_lowercase())
    });
    let form = make_country_form(config);
    let mut model = Order {
        state: "untouched".into(),
        ..order("Ada")
    };
    let mut lov = controller(&form);

    let outcome = lov.select(&mut model, germany(), &Services::new()).await;
    assert_eq!(outcome.changed, vec!["country", "currency", "email"]);
    assert!(outcome.failures.is_empty());
    assert_eq!(model.country, "DE");
    assert_eq!(model.currency, "EUR");
    assert_eq!(model.email, "sales@de.example");
    assert_eq!(model.customer, "Ada");
    assert_eq!(model.state, "untouched");
    assert_eq!(lov.selected(), [germany()]);

    let cleared = lov.clear(&mut model);
    assert_eq!(cleared, vec!["country", "currency", "email"]);
    assert_eq!(model.country, "");
    assert_eq!(model.currency, "");
    assert_eq!(model.email, "");
    assert_eq!(model.customer, "Ada");
    assert!(lov.selected().is_empty());
}

#[tokio::test]
async fn failing_mappings_are_reported_without_stopping_the_rest() {
    let config = country_lov()
        .try_map_field(&accessor!(Order, customer), |_country: &Country| {
            Err("crm offline".into())
        })
        .map_field(&accessor!(Order, state), |country: &Country| {
            if country.code == "DE" {
                panic!("no default state");
            }
            String::new()
        })
        .map_field_async(&accessor!(Order, email), |country: &Country, services| {
            async move {
                let domain = services
                    .get::<&'static str>()
                    .copied()
                    .unwrap_or("example.com");
                Ok(format!("{}@{domain}", country.code.to_lowercase()))
            }
            .boxed()
        });
    let form = FormBuilder::new("mappings")
        .field(accessor!(Order, country), |f| f.lov(config))
        .build()
        .expect("form");
    let mut lov: LovController<Order, Country> =
        LovController::for_field(&form, "country", LovSettings::default()).expect("controller");
    let mut model = Order::default();

    let services = Services::new().with("shop.test");
    let outcome = lov.select(&mut model, germany(), &services).await;

    assert_eq!(outcome.changed, vec!["country", "currency", "email"]);
    let failed: Vec<&str> = outcome
        .failures
        .iter()
        .map(|failure| failure.target.as_str())
        .collect();
    assert_eq!(failed, vec!["customer", "state"]);
    assert_eq!(outcome.failures[0].message, "crm offline");
    assert_eq!(model.email, "de@shop.test");
    assert_eq!(model.currency, "EUR");
}

#[tokio::test]
async fn multiple_selection_keeps_distinct_values() {
    let config = LovConfig::new(
        LovSource::provider(InMemoryProvider::new(countries())),
        |country: &Country| country.code.to_string(),
        |country: &Country| country.name.to_string(),
    )
    .multiple();
    let form = FormBuilder::new("tags")
        .field(accessor!(Order, tags), |f| f.lov(config))
        .build()
        .expect("form");
    let mut lov: LovController<Order, Country> =
        LovController::for_field(&form, "tags", LovSettings::default()).expect("controller");
    let services = Services::new();
    let mut model = Order::default();

    let france = countries()
        .into_iter()
        .find(|country| country.code == "FR")
        .expect("france");
    lov.select(&mut model, germany(), &services).await;
    lov.select(&mut model, france, &services).await;
    lov.select(&mut model, germany(), &services).await;
    assert_eq!(model.tags, vec!["DE", "FR"]);

    assert_eq!(lov.deselect(&mut model, &json!("DE")), vec!["tags"]);
    assert_eq!(model.tags, vec!["FR"]);
    assert!(lov.deselect(&mut model, &json!("CH")).is_empty());
}

fn make_address_form(states: RecordingStates) -> FormConfiguration<Order> {
    FormBuilder::new("address")
        .field(accessor!(Order, country), |f| f.label("Country").lov(country_lov()))
        .field(accessor!(Order, currency), |f| f.label("Currency"))
        .field(accessor!(Order, state), |f| f.label("State").lov(state_lov(states)))
        .field(accessor!(Order, state_name), |f| f.label("State name").read_only(true))
        .build()
        .expect("form")
}

#[tokio::test]
async fn changing_the_parent_clears_the_child_before_the_next_query() {
    let provider = RecordingStates::default();
    let form = make_address_form(provider.clone());
    let model = Order {
        country: "FR".into(),
        ..Order::default()
    };
    let mut session = FormSession::new(form, model);
    let mut picker: LovController<Order, State> =
        LovController::for_field(session.config(), "state", LovSettings::default())
            .expect("state controller");

    let outcome = picker.refresh(session.model(), session.services()).await;
    assert_eq!(outcome, ApplyOutcome::Applied);
    assert_eq!(picker.total_count(), 2);
    let bretagne = picker
        .items()
        .iter()
        .find(|state| state.code == "BRE")
        .cloned()
        .expect("bretagne");

    let change = session
        .select_lov(&mut picker, bretagne)
        .await
        .expect("select");
    assert_eq!(change.selection.changed, vec!["state", "state_name"]);
    assert_eq!(session.model().state, "BRE");
    assert_eq!(session.model().state_name, "Bretagne");

    let commit = session
        .commit("country", json!("DE"))
        .await
        .expect("commit");
    assert_eq!(commit.propagation.updated_fields(), vec!["state"]);
    assert_eq!(session.model().state, "");
    assert_eq!(session.model().state_name, "");

    let cleared = picker.on_dependency_changed("country", session.model_mut());
    assert_eq!(cleared, vec!["state", "state_name"]);
    assert!(picker.selected().is_empty());
    assert!(picker.items().is_empty());

    let pending = picker.open(session.model());
    assert_eq!(pending.query().context.get("country"), Some(&json!("DE")));
    picker.apply(pending.run(session.services()).await);
    assert_eq!(picker.total_count(), 3);
    assert!(picker.items().iter().all(|state| state.country == "DE"));

    let contexts: Vec<_> = provider
        .queries()
        .into_iter()
        .map(|query| query.context["country"].clone())
        .collect();
    assert_eq!(contexts, vec![json!("FR"), json!("DE")]);
}

#[tokio::test]
async fn pages_fetched_before_a_cascade_clear_are_discarded() {
    let form = make_address_form(RecordingStates::default());
    let services = Services::new();
    let mut model = Order {
        country: "FR".into(),
        ..Order::default()
    };
    let mut picker: LovController<Order, State> =
        LovController::for_field(&form, "state", LovSettings::default()).expect("controller");

    let french = picker.open(&model).run(&services).await;
    assert_eq!(french.result.as_ref().map(|page| page.total_count).ok(), Some(2));

    model.country = "DE".into();
    let cleared = picker.on_dependency_changed("country", &mut model);
    assert_eq!(cleared, vec!["state", "state_name"]);

    assert_eq!(picker.apply(french), ApplyOutcome::Superseded);
    assert!(picker.items().is_empty());
    assert_eq!(picker.total_count(), 0);
}

#[test]
fn unrelated_dependency_changes_keep_the_selection() {
    let form = make_address_form(RecordingStates::default());
    let mut lov: LovController<Order, State> =
        LovController::for_field(&form, "state", LovSettings::default()).expect("controller");
    let mut model = Order {
        state: "BY".into(),
        ..Order::default()
    };
    assert!(lov.on_dependency_changed("currency", &mut model).is_empty());
    assert_eq!(model.state, "BY");
}

#[tokio::test]
async fn locked_lov_fields_reject_selection() {
    let form = FormBuilder::new("locked")
        .field(accessor!(Order, country), |f| f.lov(country_lov()).read_only(true))
        .field(accessor!(Order, currency), |f| f)
        .build()
        .expect("form");
    let mut session = FormSession::new(form, Order::default());
    let mut lov: LovController<Order, Country> =
        LovController::for_field(session.config(), "country", LovSettings::default())
            .expect("controller");
    let result = session.select_lov(&mut lov, germany()).await;
    assert!(result.is_err());
    assert_eq!(session.model().country, "");
}
