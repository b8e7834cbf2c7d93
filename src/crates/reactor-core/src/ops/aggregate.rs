//! `count`, `sum`, `mean`, `min`, `max`, `statistics`. `mean` on an empty
//! stream divides by 1; `min`/`max` on an empty stream emit an absent
//! value.

use std::sync::{Arc, Mutex};

use serde_json::{Map, Value};

use crate::completion::Ready;
use crate::source::Source;

#[derive(Default, Clone, Copy)]
struct Accumulator {
    count: u64,
    sum: f64,
    min: Option<f64>,
    max: Option<f64>,
}

impl Accumulator {
    fn observe(&mut self, v: &Value) {
        self.count += 1;
        if let Some(n) = v.as_f64() {
            self.sum += n;
            self.min = Some(self.min.map_or(n, |m| m.min(n)));
            self.max = Some(self.max.map_or(n, |m| m.max(n)));
        }
    }

    fn mean(&self) -> f64 {
        self.sum / (self.count.max(1) as f64)
    }
}

impl Source {
    fn aggregate_with<F>(self: &Arc<Self>, label: &str, finalize: F) -> Arc<Source>
    where
        F: Fn(&Accumulator) -> Value + Send + 'static,
    {
        let downstream = self.chained(label);
        let acc: Arc<Mutex<Accumulator>> = Arc::new(Mutex::new(Accumulator::default()));
        let acc_in = Arc::clone(&acc);
        self.each_while_source(
            move |item| {
                acc_in.lock().unwrap().observe(item);
                Ok(())
            },
            &downstream,
        );

        let sink = Arc::clone(&downstream);
        self.completed().on_ready(move |ready| {
            if sink.completed().is_ready() {
                return;
            }
            match ready.clone() {
                Ready::Done(_) => {
                    let value = finalize(&acc.lock().unwrap());
                    if sink.emit(value).is_ok() {
                        let _ = sink.finish();
                    }
                }
                Ready::Failed(failure) => {
                    let _ = sink.completed().fail(failure.error, failure.tags);
                }
                Ready::Cancelled => {
                    let _ = sink.cancel();
                }
            }
        });
        downstream
    }

    /// On upstream done, emit the number of items observed.
    pub fn count(self: &Arc<Self>) -> Arc<Source> {
        self.aggregate_with("count", |a| Value::from(a.count))
    }

    /// On upstream done, emit the sum of numeric items observed (0 if none).
    pub fn sum(self: &Arc<Self>) -> Arc<Source> {
        self.aggregate_with("sum", |a| Value::from(a.sum))
    }

    /// On upstream done, emit the mean of numeric items; an empty stream
    /// divides by 1, yielding 0.
    pub fn mean(self: &Arc<Self>) -> Arc<Source> {
        self.aggregate_with("mean", |a| Value::from(a.mean()))
    }

    /// On upstream done, emit the minimum numeric item, or `null` if none
    /// were observed.
    pub fn min(self: &Arc<Self>) -> Arc<Source> {
        self.aggregate_with("min", |a| a.min.map(Value::from).unwrap_or(Value::Null))
    }

    /// On upstream done, emit the maximum numeric item, or `null` if none
    /// were observed.
    pub fn max(self: &Arc<Self>) -> Arc<Source> {
        self.aggregate_with("max", |a| a.max.map(Value::from).unwrap_or(Value::Null))
    }

    /// On upstream done, emit `{count, sum, min, max, mean}`.
    pub fn statistics(self: &Arc<Self>) -> Arc<Source> {
        self.aggregate_with("statistics", |a| {
            let mut obj = Map::new();
            obj.insert("count".to_string(), Value::from(a.count));
            obj.insert("sum".to_string(), Value::from(a.sum));
            obj.insert("min".to_string(), a.min.map(Value::from).unwrap_or(Value::Null));
            obj.insert("max".to_string(), a.max.map(Value::from).unwrap_or(Value::Null));
            obj.insert("mean".to_string(), Value::from(a.mean()));
            Value::Object(obj)
        })
    }
}
