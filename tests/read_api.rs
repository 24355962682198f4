//! Read API scenarios: cache, store fallback, on-demand harvest

mod common;

use capitol::adapter::AdapterError;
use capitol::cache::{events_key, put_events, ResultCache};
use capitol::storage::EventStore;
use capitol::CapitolApi;
use chrono::Utc;
use common::{meeting, Fixture, ScriptedAdapter};
use std::sync::Arc;
use std::time::Duration;

#[tokio::test]
async fn empty_store_triggers_one_jurisdiction_harvest() {
    let seen = Utc::now();
    let nv = Arc::new(
        ScriptedAdapter::new("NV").then_events(vec![meeting("NV", "Senate Finance", 2, "Room 2134", seen)]),
    );
    let nc = Arc::new(
        ScriptedAdapter::new("NC").then_events(vec![meeting("NC", "House Rules", 1, "Room 1228", seen)]),
    );
    let fx = Fixture::new(vec![nv.clone(), nc.clone()]);
    let api = CapitolApi::new(fx.store.clone(), fx.cache.clone()).with_harvester(fx.harvester.clone());

    let events = api.upcoming_events("nv").await;

    assert_eq!(events.len(), 1);
    assert_eq!(events[0].name, "Senate Finance");
    assert_eq!(nv.calls(), 1);
    assert_eq!(nc.calls(), 0);

    // Second read is served without scraping again
    api.upcoming_events("NV").await;
    assert_eq!(nv.calls(), 1);
}

#[tokio::test]
async fn on_demand_harvest_resolves_keys_by_jurisdiction() {
    let seen = Utc::now();
    let carson = Arc::new(
        ScriptedAdapter::new("CARSON")
            .serving("NV-CARSON-CITY")
            .then_events(vec![meeting("NV-CARSON-CITY", "Board of Supervisors", 4, "Community Center", seen)]),
    );
    let fx = Fixture::new(vec![carson.clone()]);
    let api = CapitolApi::new(fx.store.clone(), fx.cache.clone()).with_harvester(fx.harvester.clone());

    let events = api.upcoming_events("nv-carson-city").await;

    assert_eq!(events.len(), 1);
    assert_eq!(events[0].name, "Board of Supervisors");
    assert_eq!(carson.calls(), 1);
}

#[tokio::test]
async fn failed_on_demand_harvest_is_empty_not_an_error() {
    let nv = Arc::new(
        ScriptedAdapter::new("NV").then_fail(AdapterError::SourceUnreachable("dns failure".into())),
    );
    let fx = Fixture::new(vec![nv]);
    let api = CapitolApi::new(fx.store.clone(), fx.cache.clone()).with_harvester(fx.harvester.clone());

    assert!(api.upcoming_events("NV").await.is_empty());
}

#[tokio::test]
async fn stale_data_is_served_when_harvest_fails() {
    let seen = Utc::now();
    let nc = Arc::new(
        ScriptedAdapter::new("NC")
            .then_events(vec![meeting("NC", "House Rules", 1, "Room 1228", seen)])
            .then_fail(AdapterError::SourceUnreachable("connection reset".into())),
    );
    let fx = Fixture::new(vec![nc]);
    let api = CapitolApi::new(fx.store.clone(), fx.cache.clone()).with_harvester(fx.harvester.clone());

    fx.harvester.run_cycle(None).await;
    let report = fx.harvester.run_cycle(None).await;
    assert!(report.is_failed("NC"));

    api.refresh("NC").unwrap();
    let events = api.upcoming_events("NC").await;
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].location, "Room 1228");
}

#[tokio::test]
async fn past_events_in_cache_are_not_served() {
    let seen = Utc::now();
    let fx = Fixture::new(Vec::new());
    let api = CapitolApi::new(fx.store.clone(), fx.cache.clone());

    let mut past = meeting("NV", "Senate Finance", 1, "Room 2134", seen);
    past.date = common::today().pred_opt().unwrap();
    past.refresh_fingerprint();
    put_events(fx.cache.as_ref(), "NV", &[past], Duration::from_secs(60)).unwrap();

    fx.store
        .upsert_events("NV", &[meeting("NV", "Assembly Judiciary", 3, "Room 3138", seen)])
        .unwrap();

    let events = api.upcoming_events("NV").await;
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].name, "Assembly Judiciary");
}

#[tokio::test]
async fn cache_administration() {
    let seen = Utc::now();
    let nv = Arc::new(
        ScriptedAdapter::new("NV").then_events(vec![meeting("NV", "Senate Finance", 2, "Room 2134", seen)]),
    );
    let nc = Arc::new(
        ScriptedAdapter::new("NC").then_events(vec![meeting("NC", "House Rules", 1, "Room 1228", seen)]),
    );
    let fx = Fixture::new(vec![nv, nc]);
    let api = CapitolApi::new(fx.store.clone(), fx.cache.clone());

    fx.harvester.run_cycle(None).await;

    let entries = api.cache_entries(Some("events:")).unwrap();
    let keys: Vec<_> = entries.iter().map(|e| e.key.as_str()).collect();
    assert_eq!(keys, vec!["events:NC", "events:NV"]);
    assert!(entries.iter().all(|e| !e.expired && e.ttl_secs == 600));

    assert!(api.refresh("nv").unwrap());
    assert!(fx.cache.get(&events_key("NV")).unwrap().is_none());
    assert_eq!(api.cache_entries(None).unwrap().len(), 1);

    // Store still answers after the refresh
    assert_eq!(api.upcoming_events("NV").await.len(), 1);
    assert_eq!(api.cache_entries(None).unwrap().len(), 2);
}
