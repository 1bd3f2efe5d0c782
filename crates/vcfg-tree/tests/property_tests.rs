use std::sync::Arc;

use proptest::prelude::*;
use serde_json::{json, Map, Value};
use vcfg_test_utils::{
    build, model_settings_schema, register, string_list_schema, transformer, two_variant_schema,
};
use vcfg_tree::{EnhancedTree, NodeId, NodePath};

/// Keys the settings schema declares, plus a few it does not
const KEYS: &[&str] = &[
    "model",
    "temperature",
    "max_tokens",
    "stream",
    "stop",
    "headers",
    "extra",
    "response_format",
    "type",
    "name",
    "strict",
    "x-team",
    "other",
];

fn json_leaf() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        (-1000i64..1000).prop_map(|n| json!(n)),
        (-10.0f64..10.0).prop_map(|f| json!(f)),
        prop_oneof![
            Just("small"),
            Just("large"),
            Just("text"),
            Just("json_schema"),
            Just("x"),
        ]
        .prop_map(|s| json!(s)),
    ]
}

fn json_value() -> impl Strategy<Value = Value> {
    json_leaf().prop_recursive(4, 32, 5, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..5).prop_map(Value::Array),
            prop::collection::vec((prop::sample::select(KEYS), inner), 0..6).prop_map(|fields| {
                let mut map = Map::new();
                for (key, value) in fields {
                    map.insert(key.to_owned(), value);
                }
                Value::Object(map)
            }),
        ]
    })
}

fn ids(tree: &EnhancedTree) -> Vec<(NodePath, NodeId)> {
    let mut out = Vec::new();
    tree.visit(|path, node| out.push((path.clone(), node.id())));
    out
}

proptest! {
    #[test]
    fn prop_extract_of_build_equals_fill_defaults(value in json_value()) {
        let t = transformer();
        let hash = register(&t, &model_settings_schema());
        let tree = t.build(hash, Some(&value)).unwrap().tree;
        prop_assert_eq!(
            t.extract(&tree).unwrap(),
            t.fill_defaults(hash, Some(&value)).unwrap()
        );
    }

    #[test]
    fn prop_build_of_extract_is_stable(value in json_value()) {
        let t = transformer();
        let hash = register(&t, &model_settings_schema());
        let first = t.build(hash, Some(&value)).unwrap().tree;
        let params = t.extract(&first).unwrap();
        let second = t.build(hash, Some(&params)).unwrap().tree;
        prop_assert_eq!(t.extract(&second).unwrap(), params);
        prop_assert!(!t.diff(&first, &second).changed);
    }

    #[test]
    fn prop_noop_edit_keeps_ids(temperature in 0.0f64..2.0, stream in any::<bool>()) {
        let t = transformer();
        let value = json!({"temperature": temperature, "stream": stream});
        let tree = build(&t, &model_settings_schema(), Some(&value)).tree;

        let (same, ()) = t
            .edit(&tree, |draft| {
                draft.set_leaf_value(&NodePath::key("temperature"), json!(temperature))?;
                draft.set_leaf_value(&NodePath::key("stream"), json!(stream))
            })
            .unwrap();
        prop_assert!(same.ptr_eq(&tree));
        prop_assert_eq!(ids(&same), ids(&tree));
    }

    #[test]
    fn prop_insert_then_remove_restores(
        items in prop::collection::vec("[a-z]{0,4}", 0..8),
        at in any::<prop::sample::Index>(),
        item in "[a-z]{1,4}",
    ) {
        let t = transformer();
        let tree = build(&t, &string_list_schema(), Some(&json!(items))).tree;
        let index = at.index(items.len() + 1);

        let (inserted, id) = t
            .insert_array_item(&tree, &NodePath::root(), Some(index), Some(&json!(item)))
            .unwrap();
        let mut expected = items.clone();
        expected.insert(index, item);
        prop_assert_eq!(t.extract(&inserted).unwrap(), json!(expected));

        let removed = t.remove_array_item(&inserted, &NodePath::root(), id).unwrap();
        prop_assert_eq!(t.extract(&removed).unwrap(), json!(items));
        prop_assert_eq!(ids(&removed), ids(&tree));
    }

    #[test]
    fn prop_switch_carries_shared_field(x in -1000i64..1000) {
        let t = transformer();
        let tree = build(&t, &two_variant_schema(), Some(&json!({"type": "A", "x": x}))).tree;
        let x_path = NodePath::key("x");
        let x_node = Arc::clone(tree.node_at(&x_path).unwrap());

        let switched = t.switch_compound_variant(&tree, &NodePath::root(), "B").unwrap();
        prop_assert_eq!(t.extract(&switched).unwrap(), json!({"type": "B", "x": x, "y": ""}));
        prop_assert!(Arc::ptr_eq(switched.node_at(&x_path).unwrap(), &x_node));

        let back = t.switch_compound_variant(&switched, &NodePath::root(), "A").unwrap();
        prop_assert_eq!(t.extract(&back).unwrap(), json!({"type": "A", "x": x}));
    }
}
