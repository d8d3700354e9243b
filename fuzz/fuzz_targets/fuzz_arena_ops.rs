#![no_main]

use std::collections::BTreeMap;
use std::sync::Arc;

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use weft_core::{AttributeDef, ComponentArena, ComponentDef, ComponentKey, DefDescriptor, LifecycleState, ValueExpr};

#[derive(Arbitrary, Debug)]
enum Op {
    Create,
    CreateReferencing(u8),
    Destroy(u8),
    Adopt { parent: u8, child: u8 },
    Resolve(u8),
    Sweep,
}

fuzz_target!(|ops: Vec<Op>| {
    let def = Arc::new(
        ComponentDef::new(DefDescriptor::markup("fuzz", "node").expect("descriptor"))
            .attribute(AttributeDef::new("label").with_default("x"))
            .attribute(AttributeDef::new("link")),
    );
    let mut arena = ComponentArena::new();
    let mut keys: Vec<ComponentKey> = Vec::new();
    let pick = |keys: &[ComponentKey], i: u8| keys.get(usize::from(i) % keys.len().max(1)).copied();

    for op in ops.into_iter().take(256) {
        match op {
            Op::Create => keys.push(arena.instantiate(Arc::clone(&def), BTreeMap::new(), None)),
            Op::CreateReferencing(i) => {
                let mut attrs = BTreeMap::new();
                if let Some(target) = pick(&keys, i)
                    && let Ok(reference) = arena.reference(target, "v.label")
                {
                    attrs.insert("link".to_string(), ValueExpr::from(reference));
                }
                keys.push(arena.instantiate(Arc::clone(&def), attrs, None));
            }
            Op::Destroy(i) => {
                if let Some(key) = pick(&keys, i) {
                    arena.destroy(key);
                    assert!(!arena.destroy(key));
                }
            }
            Op::Adopt { parent, child } => {
                if let (Some(p), Some(c)) = (pick(&keys, parent), pick(&keys, child))
                    && p != c
                {
                    let _ = arena.push_body(p, c);
                }
            }
            Op::Resolve(i) => {
                if let Some(key) = pick(&keys, i) {
                    let result = arena.get_value(key, "v.label");
                    if arena.state(key) == Some(LifecycleState::Destroyed) {
                        assert!(result.is_err_and(|e| e.is_destroyed()));
                    }
                    let _ = arena.get_value(key, "v.link");
                }
            }
            Op::Sweep => {
                arena.sweep();
            }
        }
    }
});
