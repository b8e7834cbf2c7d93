//! The combining operators: `merge`, `combine_latest`, `with_latest_from`,
//! `apply`, `each_as_source`, `switch_str`, `ordered_futures`, `catch`.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use serde_json::Value;

use crate::completion::{Completion, Ready};
use crate::source::Source;
use crate::value_ext::as_text;

pub type Combine = Box<dyn Fn(&[Value]) -> Value + Send + Sync>;

/// The result of resolving `switch_str`'s condition for one item: either
/// immediately available, or pending on a completion handle.
#[derive(Clone)]
pub enum Resolved {
    /// The condition resolved synchronously.
    Value(Value),
    /// The condition is still pending; dispatch happens when it settles.
    Pending(Completion),
}

fn wire_completion_branch(
    source: &Arc<Source>,
    downstream: &Arc<Source>,
    remaining: Arc<AtomicUsize>,
) {
    let sink = Arc::clone(downstream);
    source.completed().on_ready(move |ready| {
        if sink.completed().is_ready() {
            return;
        }
        match ready.clone() {
            Ready::Failed(failure) => {
                let _ = sink.completed().fail(failure.error, failure.tags);
            }
            _ => {
                if remaining.fetch_sub(1, Ordering::SeqCst) == 1 {
                    let _ = sink.finish();
                }
            }
        }
    });
}

impl Source {
    /// Forward every item from `self` and every source in `others`, in
    /// whatever order they arrive; finish once every upstream has
    /// completed. Any upstream failure fails this immediately.
    pub fn merge(self: &Arc<Self>, others: &[Arc<Source>]) -> Arc<Source> {
        let downstream = self.chained("merge");
        let remaining = Arc::new(AtomicUsize::new(1 + others.len()));

        let sink = Arc::clone(&downstream);
        self.each_while_source(move |item| sink.emit(item.clone()), &downstream);
        wire_completion_branch(self, &downstream, Arc::clone(&remaining));

        for other in others {
            let sink = Arc::clone(&downstream);
            other.each_while_source(move |item| sink.emit(item.clone()), &downstream);
            wire_completion_branch(other, &downstream, Arc::clone(&remaining));
        }
        downstream
    }

    /// Maintain the latest item from `self` and every source in `others`;
    /// once every upstream has emitted at least once ("saturation"), each
    /// further emission from any upstream produces `combine(latest...)`
    /// (or the latest values as an array, if `combine` is omitted).
    /// Completes as soon as any upstream completes.
    pub fn combine_latest(self: &Arc<Self>, others: &[Arc<Source>], combine: Option<Combine>) -> Arc<Source> {
        let k = 1 + others.len();
        let downstream = self.chained("combine_latest");
        let latest: Arc<Mutex<Vec<Option<Value>>>> = Arc::new(Mutex::new(vec![None; k]));
        let combine = Arc::new(combine);

        let wire_branch = |source: &Arc<Source>, index: usize| {
            let sink = Arc::clone(&downstream);
            let latest = Arc::clone(&latest);
            let combine = Arc::clone(&combine);
            source.each_while_source(
                move |item| {
                    let mut slots = latest.lock().unwrap();
                    slots[index] = Some(item.clone());
                    if slots.iter().all(Option::is_some) {
                        let values: Vec<Value> = slots.iter().map(|v| v.clone().unwrap()).collect();
                        drop(slots);
                        let emitted = match combine.as_ref() {
                            Some(f) => f(&values),
                            None => Value::Array(values),
                        };
                        sink.emit(emitted)?;
                    }
                    Ok(())
                },
                &downstream,
            );
        };
        wire_branch(self, 0);
        for (i, other) in others.iter().enumerate() {
            wire_branch(other, i + 1);
        }

        // Any single upstream's completion settles this one (if saturation
        // is never reached, the downstream simply stays silently pending).
        for source in std::iter::once(Arc::clone(self)).chain(others.iter().cloned()) {
            let sink = Arc::clone(&downstream);
            source.completed().on_ready(move |ready| {
                if sink.completed().is_ready() {
                    return;
                }
                let _ = match ready.clone() {
                    Ready::Done(_) => sink.finish(),
                    Ready::Failed(failure) => sink.completed().fail(failure.error, failure.tags),
                    Ready::Cancelled => sink.cancel(),
                };
            });
        }
        downstream
    }

    /// `self` is the primary: each of its emissions, once at least one of
    /// `others`' latest slots is populated, emits `combine(latest...)`.
    /// `others` only update their slots; they never themselves trigger an
    /// emission. Completes when the primary completes.
    pub fn with_latest_from(self: &Arc<Self>, others: &[Arc<Source>], combine: Option<Combine>) -> Arc<Source> {
        let downstream = self.chained("with_latest_from");
        let latest: Arc<Mutex<Vec<Option<Value>>>> = Arc::new(Mutex::new(vec![None; others.len()]));

        for (i, other) in others.iter().enumerate() {
            let latest = Arc::clone(&latest);
            other.each_while_source(
                move |item| {
                    latest.lock().unwrap()[i] = Some(item.clone());
                    Ok(())
                },
                &downstream,
            );
        }

        let sink = Arc::clone(&downstream);
        self.each_while_source(
            move |item| {
                let slots = latest.lock().unwrap();
                if slots.iter().any(Option::is_some) {
                    let values: Vec<Value> = std::iter::once(item.clone())
                        .chain(slots.iter().map(|v| v.clone().unwrap_or(Value::Null)))
                        .collect();
                    let emitted = match &combine {
                        Some(f) => f(&values),
                        None => Value::Array(values),
                    };
                    drop(slots);
                    sink.emit(emitted)?;
                }
                Ok(())
            },
            &downstream,
        );
        super::forward_terminal(self, &downstream);
        downstream
    }

    /// Pass every upstream item through untouched; additionally invoke each
    /// of `factories` with `self` once, and complete only once every
    /// factory-returned source has finished.
    pub fn apply<F>(self: &Arc<Self>, factories: Vec<F>) -> Arc<Source>
    where
        F: FnOnce(&Arc<Source>) -> Arc<Source>,
    {
        let downstream = self.chained("apply");
        let sink = Arc::clone(&downstream);
        self.each_while_source(move |item| sink.emit(item.clone()), &downstream);

        let tracked: Vec<Arc<Source>> = factories.into_iter().map(|f| f(self)).collect();
        let remaining = Arc::new(AtomicUsize::new(1 + tracked.len()));
        wire_completion_branch(self, &downstream, Arc::clone(&remaining));
        for source in &tracked {
            wire_completion_branch(source, &downstream, Arc::clone(&remaining));
        }
        downstream
    }

    /// For each upstream item, invoke each of `factories` with it, pass the
    /// item through untouched, and track the returned sources. Completes
    /// once upstream and every tracked source have finished.
    pub fn each_as_source<F>(self: &Arc<Self>, mut factories: Vec<F>) -> Arc<Source>
    where
        F: FnMut(&Value) -> Arc<Source> + Send + 'static,
    {
        let downstream = self.chained("each_as_source");
        let remaining = Arc::new(AtomicUsize::new(1));
        let sink = Arc::clone(&downstream);
        let remaining_items = Arc::clone(&remaining);
        let downstream_for_tracking = Arc::clone(&downstream);
        self.each_while_source(
            move |item| {
                sink.emit(item.clone())?;
                for factory in factories.iter_mut() {
                    let tracked = factory(item);
                    remaining_items.fetch_add(1, Ordering::SeqCst);
                    wire_completion_branch(&tracked, &downstream_for_tracking, Arc::clone(&remaining_items));
                }
                Ok(())
            },
            &downstream,
        );
        wire_completion_branch(self, &downstream, remaining);
        downstream
    }

    /// For each upstream item, resolve `cond(item)` — synchronously or via
    /// a pending completion handle — and find the first branch whose key
    /// string-equals the resolved value, emitting `branches[key](item)`;
    /// falls back to `default(item)` if given, else silently drops the
    /// item.
    pub fn switch_str<C, F, D>(
        self: &Arc<Self>,
        mut cond: C,
        branches: Vec<(String, F)>,
        default: Option<D>,
    ) -> Arc<Source>
    where
        C: FnMut(&Value) -> Resolved + Send + 'static,
        F: Fn(&Value) -> Value + Send + Sync + 'static,
        D: Fn(&Value) -> Value + Send + Sync + 'static,
    {
        let downstream = self.chained("switch_str");
        let branches = Arc::new(branches);
        let default = Arc::new(default);

        let dispatch = {
            let branches = Arc::clone(&branches);
            let default = Arc::clone(&default);
            move |sink: &Arc<Source>, resolved: &Value, item: &Value| -> crate::error::Result<()> {
                let key = as_text(resolved);
                if let Some((_, f)) = branches.iter().find(|(k, _)| *k == key) {
                    sink.emit(f(item))?;
                } else if let Some(f) = default.as_ref() {
                    sink.emit(f(item))?;
                }
                Ok(())
            }
        };

        let sink = Arc::clone(&downstream);
        self.each_while_source(
            move |item| match cond(item) {
                Resolved::Value(v) => dispatch(&sink, &v, item),
                Resolved::Pending(handle) => {
                    let sink = Arc::clone(&sink);
                    let dispatch = dispatch.clone();
                    let item = item.clone();
                    handle.on_ready(move |ready| {
                        if let Ready::Done(v) = ready.clone() {
                            let _ = dispatch(&sink, &v, &item);
                        }
                    });
                    Ok(())
                }
            },
            &downstream,
        );
        super::forward_terminal(self, &downstream);
        downstream
    }

    /// Build a source from a fixed set of completion handles: each is
    /// observed independently and its done value is emitted in completion
    /// order, not the order `futures` was given in; any failure fails this
    /// source immediately with that future's payload.
    ///
    /// This models "upstream emits completion handles" as the future set
    /// being known up front, since a `Completion` is not itself a `Value`
    /// and so cannot flow through an ordinary item stream.
    pub fn ordered_futures(label: impl Into<String>, futures: Vec<Completion>) -> Arc<Source> {
        let root = Source::new(label);
        let remaining = Arc::new(AtomicUsize::new(futures.len()));
        if futures.is_empty() {
            let _ = root.finish();
            return root;
        }
        for future in futures {
            let sink = Arc::clone(&root);
            let remaining = Arc::clone(&remaining);
            future.on_ready(move |ready| {
                if sink.completed().is_ready() {
                    return;
                }
                match ready.clone() {
                    Ready::Done(value) => {
                        if sink.emit(value).is_err() {
                            return;
                        }
                        if remaining.fetch_sub(1, Ordering::SeqCst) == 1 {
                            let _ = sink.finish();
                        }
                    }
                    Ready::Failed(failure) => {
                        let _ = sink.completed().fail(failure.error, failure.tags);
                    }
                    Ready::Cancelled => {
                        if remaining.fetch_sub(1, Ordering::SeqCst) == 1 {
                            let _ = sink.finish();
                        }
                    }
                }
            });
        }
        root
    }

    /// Pass items through; on upstream failure, call `handler(err)`. If it
    /// returns `Some(source)`, splice that source's emissions into this
    /// one and inherit its completion; otherwise propagate the failure.
    pub fn catch<H>(self: &Arc<Self>, mut handler: H) -> Arc<Source>
    where
        H: FnMut(&Value) -> Option<Arc<Source>> + Send + 'static,
    {
        let downstream = self.chained("catch");
        let sink = Arc::clone(&downstream);
        self.each_while_source(move |item| sink.emit(item.clone()), &downstream);

        let sink = Arc::clone(&downstream);
        self.completed().on_ready(move |ready| {
            if sink.completed().is_ready() {
                return;
            }
            match ready.clone() {
                Ready::Done(value) => {
                    let _ = sink.finish_with(value);
                }
                Ready::Cancelled => {
                    let _ = sink.cancel();
                }
                Ready::Failed(failure) => match handler(&failure.error) {
                    Some(recovered) => {
                        let fallback = Arc::clone(&sink);
                        recovered.each_while_source(move |item| fallback.emit(item.clone()), &sink);
                        super::forward_terminal(&recovered, &sink);
                        // The fallback is typically a lazy factory source
                        // (e.g. `from_sequence`) that only starts emitting
                        // once driven, the same kick-off `bridge::get`
                        // performs for the original chain's root.
                        if let Some(on_get) = recovered.root().take_on_get() {
                            on_get(&recovered.root());
                        }
                    }
                    None => {
                        let _ = sink.completed().fail(failure.error, failure.tags);
                    }
                },
            }
        });
        downstream
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::get;
    use crate::factory::from_sequence;

    fn seq(items: &[i64]) -> Arc<Source> {
        from_sequence("seq", items.iter().map(|v| Value::from(*v)).collect())
    }

    #[test]
    fn merge_forwards_every_source_and_completes_when_all_do() {
        let a = Source::new("a");
        let b = Source::new("b");
        let merged = a.merge(&[Arc::clone(&b)]);
        a.emit(Value::from(1)).unwrap();
        b.emit(Value::from(10)).unwrap();
        a.emit(Value::from(2)).unwrap();
        a.finish().unwrap();
        assert!(!merged.completed().is_ready());
        b.finish().unwrap();
        let items = get(&merged).unwrap();
        assert_eq!(items, vec![Value::from(1), Value::from(10), Value::from(2)]);
    }

    #[test]
    fn combine_latest_emits_combined_value_after_each_emission_once_saturated() {
        let a = Source::new("a");
        let b = Source::new("b");
        let combined = a.combine_latest(
            &[Arc::clone(&b)],
            Some(Box::new(|vs: &[Value]| Value::from(vs[0].as_i64().unwrap() + vs[1].as_i64().unwrap()))),
        );
        let seen = Arc::new(Mutex::new(Vec::new()));
        let s = seen.clone();
        combined.each(move |item| {
            s.lock().unwrap().push(item.clone());
            Ok(())
        });

        a.emit(Value::from(1)).unwrap();
        a.emit(Value::from(2)).unwrap();
        b.emit(Value::from(10)).unwrap();
        a.emit(Value::from(3)).unwrap();
        b.emit(Value::from(20)).unwrap();

        assert_eq!(*seen.lock().unwrap(), vec![Value::from(12), Value::from(13), Value::from(23)]);
    }

    #[test]
    fn combine_latest_emits_nothing_before_saturation() {
        let a = Source::new("a");
        let b = Source::new("b");
        let combined = a.combine_latest(&[Arc::clone(&b)], None);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let s = seen.clone();
        combined.each(move |item| {
            s.lock().unwrap().push(item.clone());
            Ok(())
        });
        a.emit(Value::from(1)).unwrap();
        a.emit(Value::from(2)).unwrap();
        assert!(seen.lock().unwrap().is_empty());
    }

    #[test]
    fn with_latest_from_only_primary_triggers_emission() {
        let primary = Source::new("primary");
        let other = Source::new("other");
        let combined = primary.with_latest_from(
            &[Arc::clone(&other)],
            Some(Box::new(|vs: &[Value]| Value::Array(vs.to_vec()))),
        );
        let seen = Arc::new(Mutex::new(Vec::new()));
        let s = seen.clone();
        combined.each(move |item| {
            s.lock().unwrap().push(item.clone());
            Ok(())
        });

        primary.emit(Value::from("a")).unwrap();
        assert!(seen.lock().unwrap().is_empty(), "no emission before any slot is populated");
        other.emit(Value::from(1)).unwrap();
        assert!(seen.lock().unwrap().is_empty(), "other's own emission must not trigger");
        primary.emit(Value::from("b")).unwrap();
        assert_eq!(
            *seen.lock().unwrap(),
            vec![Value::Array(vec![Value::from("b"), Value::from(1)])]
        );
    }

    #[test]
    fn catch_recovers_with_fallback_source() {
        let root = Source::new("root");
        let recovered_chain = root.catch(|_err| Some(seq(&[9, 9])));
        root.emit(Value::from(1)).unwrap();
        root.fail(Value::from("boom")).unwrap();
        let items = get(&recovered_chain).unwrap();
        assert_eq!(items, vec![Value::from(1), Value::from(9), Value::from(9)]);
    }

    #[test]
    fn catch_without_recovery_propagates_failure() {
        let root = Source::new("root");
        let chain = root.catch(|_err| None);
        root.fail(Value::from("boom")).unwrap();
        let err = get(&chain).unwrap_err();
        assert_eq!(err.error, Value::from("boom"));
    }

    #[test]
    fn ordered_futures_emits_in_completion_order_then_fails_on_first_failure() {
        let f1 = Completion::new();
        let f2 = Completion::new();
        let f3 = Completion::new();
        let root = Source::ordered_futures("futures", vec![f1.clone(), f2.clone(), f3.clone()]);

        let seen = Arc::new(Mutex::new(Vec::new()));
        let s = seen.clone();
        root.each(move |item| {
            s.lock().unwrap().push(item.clone());
            Ok(())
        });

        f1.done(Value::from(10)).unwrap();
        f2.done(Value::from(20)).unwrap();
        f3.fail(Value::from("e"), vec![]).unwrap();

        assert_eq!(*seen.lock().unwrap(), vec![Value::from(10), Value::from(20)]);
        assert!(root.completed().is_failed());
        assert_eq!(root.completed().failure().unwrap().error, Value::from("e"));
    }

    #[test]
    fn ordered_futures_with_empty_input_finishes_immediately() {
        let root = Source::ordered_futures("futures", vec![]);
        assert!(root.completed().is_done());
    }

    #[test]
    fn switch_str_dispatches_once_a_pending_condition_resolves() {
        let root = Source::new("root");
        let cond_handle = Completion::new();
        let cond_handle_for_closure = cond_handle.clone();
        let switched = root.switch_str(
            move |_item| Resolved::Pending(cond_handle_for_closure.clone()),
            vec![
                ("odd".to_string(), (|item: &Value| Value::from(format!("odd:{item}"))) as fn(&Value) -> Value),
                ("even".to_string(), (|item: &Value| Value::from(format!("even:{item}"))) as fn(&Value) -> Value),
            ],
            None::<fn(&Value) -> Value>,
        );
        let seen = Arc::new(Mutex::new(Vec::new()));
        let s = seen.clone();
        switched.each(move |item| {
            s.lock().unwrap().push(item.clone());
            Ok(())
        });

        root.emit(Value::from(4)).unwrap();
        assert!(seen.lock().unwrap().is_empty(), "no dispatch before the condition resolves");
        cond_handle.done(Value::from("even")).unwrap();
        assert_eq!(*seen.lock().unwrap(), vec![Value::from("even:4")]);
    }

    #[test]
    fn switch_str_falls_back_to_default_when_no_key_matches() {
        let root = Source::new("root");
        let switched = root.switch_str(
            |item| Resolved::Value(item.clone()),
            vec![("a".to_string(), (|item: &Value| item.clone()) as fn(&Value) -> Value)],
            Some(|item: &Value| Value::from(format!("default:{item}"))),
        );
        let seen = Arc::new(Mutex::new(Vec::new()));
        let s = seen.clone();
        switched.each(move |item| {
            s.lock().unwrap().push(item.clone());
            Ok(())
        });
        root.emit(Value::from("z")).unwrap();
        assert_eq!(*seen.lock().unwrap(), vec![Value::from("default:z")]);
    }

    #[test]
    fn apply_passes_items_through_and_waits_on_every_factory_source() {
        let root = Source::new("root");
        let side_a = Source::new("side_a");
        let side_b = Source::new("side_b");
        let side_a_for_factory = Arc::clone(&side_a);
        let side_b_for_factory = Arc::clone(&side_b);
        let factories: Vec<Box<dyn FnOnce(&Arc<Source>) -> Arc<Source>>> = vec![
            Box::new(move |_: &Arc<Source>| Arc::clone(&side_a_for_factory)),
            Box::new(move |_: &Arc<Source>| Arc::clone(&side_b_for_factory)),
        ];
        let applied = root.apply(factories);

        root.emit(Value::from(1)).unwrap();
        root.finish().unwrap();
        assert!(!applied.completed().is_ready(), "must wait on the factory sources too");

        side_a.finish().unwrap();
        assert!(!applied.completed().is_ready());
        side_b.finish().unwrap();

        let items = get(&applied).unwrap();
        assert_eq!(items, vec![Value::from(1)]);
    }

    #[test]
    fn each_as_source_tracks_a_source_spawned_per_item() {
        let root = Source::new("root");
        let spawned = Arc::new(Mutex::new(Vec::new()));
        let spawned_for_factory = Arc::clone(&spawned);
        let each_applied = root.each_as_source(vec![move |item: &Value| {
            let child = Source::new(format!("child-{item}"));
            spawned_for_factory.lock().unwrap().push(Arc::clone(&child));
            child
        }]);

        root.emit(Value::from(1)).unwrap();
        root.finish().unwrap();
        assert!(!each_applied.completed().is_ready(), "must wait on the spawned source too");

        spawned.lock().unwrap()[0].finish().unwrap();

        let items = get(&each_applied).unwrap();
        assert_eq!(items, vec![Value::from(1)]);
    }
}
