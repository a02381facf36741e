use chrono::{TimeZone, Utc};
use pretty_assertions::assert_eq;
use proptest::prelude::*;
use shimmysmarty::{Binding, Environment, Template, Value};

fn render(source: &str, env: &mut Environment) -> String {
    Template::parse(source)
        .unwrap_or_else(|err| panic!("{err}"))
        .render(env)
}

// ── Text and variables ──

#[test]
fn plain_text_is_copied() {
    let mut env = Environment::default();
    assert_eq!(render("Hello, world!", &mut env), "Hello, world!");
    assert_eq!(render("", &mut env), "");
}

#[test]
fn variable_substitution() {
    let mut env = Environment::new([Binding::new("name", "Smarty")]).unwrap();
    assert_eq!(render("Hello, {$name}!", &mut env), "Hello, Smarty!");
}

#[test]
fn whitespace_inside_tags_is_ignored() {
    let mut env = Environment::default().with_var("name", "Smarty");
    assert_eq!(render("Hello, {  $name   }!", &mut env), "Hello, Smarty!");
}

#[test]
fn numbers_render_without_trailing_zeros() {
    let mut env = Environment::default()
        .with_var("positive", 777)
        .with_var("negative", -777)
        .with_var("half", 0.5);
    assert_eq!(
        render("{$positive} {$negative} {$half}", &mut env),
        "777 -777 0.5"
    );
}

#[test]
fn missing_variable_renders_nothing() {
    let mut env = Environment::default();
    assert_eq!(render("[{$nobody}]", &mut env), "[]");
}

#[test]
fn map_fields_and_nested_access() {
    let user = Value::map([
        ("name", Value::String("Alice".into())),
        ("address", Value::map([("city", "Oslo")])),
    ]);
    let mut env = Environment::default().with_var("user", user);
    assert_eq!(
        render("{$user.name} lives in {$user.address.city}", &mut env),
        "Alice lives in Oslo"
    );
    assert_eq!(render("[{$user.age}]", &mut env), "[]");
}

#[test]
fn array_indexing() {
    let mut env = Environment::default()
        .with_var("ids", vec![1, 2, 3, 4])
        .with_var("i", 2);
    assert_eq!(
        render("{$ids[0]}{$ids[1]}{$ids[2]}{$ids[3]}", &mut env),
        "1234"
    );
    assert_eq!(render("{$ids[$i]}", &mut env), "3");
    assert_eq!(render("[{$ids[4]}]", &mut env), "[]");
}

#[test]
fn optional_index_is_unwrapped() {
    let mut env = Environment::default()
        .with_var("ids", vec![10, 20, 30])
        .with_var("i", Some(1))
        .with_var("gone", None::<i32>);
    assert_eq!(render("{$ids[$i]}", &mut env), "20");
    assert_eq!(render("[{$ids[$gone]}]", &mut env), "[]");
}

#[test]
fn time_renders_as_rfc3339() {
    let created = Utc.with_ymd_and_hms(2024, 1, 3, 15, 4, 6).unwrap();
    let mut env = Environment::default().with_var("created_at", created);
    assert_eq!(render("{$created_at}", &mut env), "2024-01-03T15:04:06Z");
}

#[test]
fn optional_values() {
    let mut env = Environment::default()
        .with_var("some", Some("here"))
        .with_var("none", None::<String>);
    assert_eq!(render("[{$some}][{$none}]", &mut env), "[here][]");
}

#[test]
fn booleans_render_as_words() {
    let mut env = Environment::default().with_var("yes", true).with_var("no", false);
    assert_eq!(render("{$yes}/{$no}", &mut env), "true/false");
}

// ── Comments and literal blocks ──

#[test]
fn inline_comment_is_dropped() {
    let mut env = Environment::default().with_var("name", "Smarty");
    assert_eq!(
        render("Hello,{* Comment *} {$name}!", &mut env),
        "Hello, Smarty!"
    );
}

#[test]
fn multiline_comment_is_dropped() {
    let mut env = Environment::default();
    let source = "{*\n  The header\n  goes here\n*}\n<span>Hello</span>";
    assert_eq!(render(source, &mut env), "\n<span>Hello</span>");
}

#[test]
fn literal_block_is_not_interpreted() {
    let mut env = Environment::default().with_var("x", "ignored");
    assert_eq!(
        render("<style>{literal}p { color: {$x}; }{/literal}</style>", &mut env),
        "<style>p { color: {$x}; }</style>"
    );
}

// ── Concurrency ──

#[test]
fn shared_template_renders_on_many_threads() {
    let template = Template::parse("{foreach from=$l item=i}{$i|upper}{/foreach}").unwrap();
    std::thread::scope(|s| {
        for n in 0..8 {
            let template = &template;
            s.spawn(move || {
                let word = format!("t{n}");
                let mut env = Environment::default().with_var("l", vec![word.clone(); 3]);
                assert_eq!(template.render(&mut env), word.to_uppercase().repeat(3));
            });
        }
    });
}

proptest! {
    #[test]
    fn text_without_braces_passes_through(text in "[^{]*") {
        let mut env = Environment::default();
        prop_assert_eq!(render(&text, &mut env), text);
    }
}
