//! A conjunctive selector flips when either constrained value changes

use proptest::prelude::*;
use provenant_core::{Map, Value};
use provenant_record::{Record, RunSpecification, Selector};

fn record(a: i64, b: &str) -> Record {
    let mut params = Map::new();
    params.insert("a".into(), Value::from(a));
    params.insert("b".into(), Value::from(b));
    Record::new(RunSpecification::new("demo::main", params, 0), Value::Null)
}

proptest! {
    #[test]
    fn conjunction_requires_both(x in any::<i64>(), y in "[a-z]{1,6}", dx in 1i64..1000, dy in "[A-Z]{1,3}") {
        let selector = Selector::new()
            .equal("run_specification.parameters.a", x)
            .equal("run_specification.parameters.b", y.clone());

        prop_assert!(selector.matches(&record(x, &y)));
        prop_assert!(!selector.matches(&record(x.wrapping_add(dx), &y)));
        let other_y = format!("{y}{dy}");
        prop_assert!(!selector.matches(&record(x, &other_y)));
        prop_assert!(!selector.matches(&record(x.wrapping_add(dx), &other_y)));
    }
}

#[test]
fn scenario_name_lookup() {
    let mut params = Map::new();
    params.insert("n".into(), Value::from(3));
    let r = Record::new(RunSpecification::new("demo::main", params, 0), 42);

    assert!(Selector::new().equal("run_specification.name", "demo::main").matches(&r));
    assert!(!Selector::new().equal("run_specification.name", "demo::other").matches(&r));
    assert!(Selector::uid(r.uid()).matches(&r));
}
