//! Pre/post-send observer guarantees.

use std::cell::RefCell;
use std::rc::Rc;

use serde_json::json;
use weft_harness::DefinitionServer;
use weft_runtime::{ActionBuilder, ActionDef, ActionId, ActionState, Runtime, RuntimeConfig, SendPhase};

fn ping() -> ActionDef {
    ActionDef::new("ObserverController", "ping").optional("n")
}

#[test]
fn pre_send_sees_the_full_batch_and_post_send_sees_results() {
    let mut rt = Runtime::new(RuntimeConfig::default(), DefinitionServer::new());
    let log: Rc<RefCell<Vec<(SendPhase, Vec<ActionId>, Vec<ActionState>)>>> = Rc::default();
    let pre_log = Rc::clone(&log);
    let post_log = Rc::clone(&log);
    rt.register_pre_post_send(
        move |ctx, actions| {
            pre_log.borrow_mut().push((
                ctx.phase(),
                actions.iter().map(|a| a.id()).collect(),
                actions.iter().map(|a| a.state()).collect(),
            ));
        },
        move |ctx, actions| {
            post_log.borrow_mut().push((
                ctx.phase(),
                actions.iter().map(|a| a.id()).collect(),
                actions.iter().map(|a| a.state()).collect(),
            ));
        },
    );

    let a = rt.enqueue(ActionBuilder::new(ping()).param("n", json!(1))).unwrap();
    let b = rt.enqueue(ActionBuilder::new(ping()).param("n", json!(2))).unwrap();
    rt.run_until_idle().unwrap();

    let log = log.borrow();
    assert_eq!(log.len(), 2);
    assert_eq!(log[0].0, SendPhase::PreSend);
    assert_eq!(log[0].1, vec![a.id(), b.id()]);
    assert_eq!(log[0].2, vec![ActionState::Queued, ActionState::Queued]);
    assert_eq!(log[1].0, SendPhase::PostSend);
    assert_eq!(log[1].2, vec![ActionState::Completed, ActionState::Completed]);
}

#[test]
fn actions_enqueued_by_an_observer_wait_for_the_next_batch() {
    let server = DefinitionServer::new();
    let mut rt = Runtime::new(RuntimeConfig::default(), server.clone());
    let spawned = Rc::new(RefCell::new(Vec::new()));
    let slot = Rc::clone(&spawned);
    rt.queue_mut().on_pre_send(move |ctx, actions| {
        if actions.len() == 1 && slot.borrow().is_empty() {
            let h = ctx.enqueue(ActionBuilder::new(ping())).unwrap();
            slot.borrow_mut().push(h);
        }
    });
    rt.enqueue(ActionBuilder::new(ping())).unwrap();
    rt.run_until_idle().unwrap();

    let requests = server.requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[0].actions.len(), 1);
    assert_eq!(requests[1].actions.len(), 1);
    assert_eq!(spawned.borrow()[0].state(), ActionState::Completed);
}

#[test]
fn removing_another_observer_applies_after_the_pass() {
    let mut rt = Runtime::new(RuntimeConfig::default(), DefinitionServer::new());
    let calls = Rc::new(RefCell::new(Vec::new()));

    let second_handle = Rc::new(RefCell::new(None));
    let first_calls = Rc::clone(&calls);
    let target = Rc::clone(&second_handle);
    rt.queue_mut().on_pre_send(move |ctx, _| {
        first_calls.borrow_mut().push("first");
        if let Some(h) = *target.borrow() {
            ctx.remove_callback(h);
        }
    });
    let second_calls = Rc::clone(&calls);
    let h = rt.queue_mut().on_pre_send(move |_, _| second_calls.borrow_mut().push("second"));
    *second_handle.borrow_mut() = Some(h);

    rt.enqueue(ActionBuilder::new(ping())).unwrap();
    rt.run_until_idle().unwrap();
    rt.enqueue(ActionBuilder::new(ping())).unwrap();
    rt.run_until_idle().unwrap();

    assert_eq!(*calls.borrow(), vec!["first", "second", "first"]);
    assert!(!rt.remove_callback(h));
}

#[test]
fn server_errors_are_per_action() {
    let server = DefinitionServer::new();
    let failing = ActionDef::new("ObserverController", "explode");
    server.fail_action(&failing, "kaboom");
    let mut rt = Runtime::new(RuntimeConfig::default(), server);

    let ok = rt.enqueue(ActionBuilder::new(ping())).unwrap();
    let bad = rt.enqueue(ActionBuilder::new(failing)).unwrap();
    rt.run_until_idle().unwrap();

    assert_eq!(ok.state(), ActionState::Completed);
    assert_eq!(bad.state(), ActionState::Errored);
    assert_eq!(rt.errors().count("server error: kaboom"), 1);
}
