use std::collections::HashMap;

use chrono::{DateTime, TimeZone, Utc};
use pretty_assertions::assert_eq;
use serde::Serialize;
use shimmysmarty::{Binding, Engine, Environment, EnvironmentError, Template, Value};

fn render(source: &str, env: &mut Environment) -> String {
    Template::parse(source)
        .unwrap_or_else(|err| panic!("{err}"))
        .render(env)
}

#[derive(Serialize)]
struct Meta {
    title: &'static str,
    #[serde(with = "shimmysmarty::ser::time")]
    created_at: DateTime<Utc>,
    nickname: Option<&'static str>,
    tags: Vec<&'static str>,
}

// ── Record bindings ──

#[test]
fn serialized_records_keep_time_and_optional() {
    let meta = Meta {
        title: "Notes",
        created_at: Utc.timestamp_opt(0, 0).unwrap(),
        nickname: None,
        tags: vec!["a", "b"],
    };
    let mut env = Environment::new([Binding::serialize("m", &meta)]).unwrap();

    assert_eq!(
        render(
            "{if $m.created_at}T{else}F{/if}/{if $m.nickname}T{else}F{/if}",
            &mut env
        ),
        "F/F"
    );
    assert_eq!(
        render("{$m.title}: {$m.created_at} [{$m.nickname}]", &mut env),
        "Notes: 1970-01-01T00:00:00Z []"
    );
    assert_eq!(
        render("{foreach from=$m.tags item=t}{$t}{/foreach}", &mut env),
        "ab"
    );
}

#[test]
fn present_optional_fields_render_their_value() {
    let meta = Meta {
        title: "Notes",
        created_at: Utc.with_ymd_and_hms(2024, 1, 3, 15, 4, 6).unwrap(),
        nickname: Some("nb"),
        tags: Vec::new(),
    };
    let mut env = Environment::new([Binding::serialize("m", &meta)]).unwrap();
    assert_eq!(
        render("{$m.nickname|upper} {$m.created_at}", &mut env),
        "NB 2024-01-03T15:04:06Z"
    );
}

#[test]
fn typed_and_serialized_bindings_mix() {
    let mut env = Environment::new([
        Binding::new("name", "Smarty"),
        Binding::new("count", 3),
        Binding::serialize("ids", &[1, 2, 3]),
        Binding::new("raw", Value::Boolean(true)),
    ])
    .unwrap();
    assert_eq!(
        render("{$name} {$count} {$ids[2]} {$raw}", &mut env),
        "Smarty 3 3 true"
    );
}

// ── Conversion failures ──

#[test]
fn every_failed_binding_is_reported() {
    let mut bad = HashMap::new();
    bad.insert(vec![1], "x");

    let err = Environment::new([
        Binding::serialize("first", &bad),
        Binding::new("fine", "ok"),
        Binding::serialize("second", &bad),
    ])
    .unwrap_err();

    let EnvironmentError::Conversion(failures) = &err;
    let names: Vec<_> = failures.iter().map(|f| f.name.as_str()).collect();
    assert_eq!(names, vec!["first", "second"]);
    assert_eq!(
        err.to_string(),
        "2 binding(s) failed to convert: \
         cannot convert binding `first`: map key must be a string, got array\n\
         cannot convert binding `second`: map key must be a string, got array"
    );
}

#[test]
fn engine_environment_reports_conversion_failures() {
    let mut bad = HashMap::new();
    bad.insert((1, 2), "x");

    let engine = Engine::new();
    let err = engine
        .environment([Binding::serialize("pairs", &bad)])
        .unwrap_err();
    let EnvironmentError::Conversion(failures) = err;
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].name, "pairs");
}

// ── Registries ──

#[test]
fn default_environments_do_not_share_registrations() {
    let first = Environment::default();
    let mut second = Environment::default().with_var("w", "hi");
    first.modifiers().register("upper", |_| Value::String("replaced".into()));
    assert_eq!(render("{$w|upper}", &mut second), "HI");
}
