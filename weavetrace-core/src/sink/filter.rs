//! Interval-gated recording
//!
//! [`FilterSink`] wraps another sink and forwards events only while
//! recording is enabled. An event whose dataId matches the start
//! predicate enables recording and is itself forwarded; an event
//! matching the end predicate is forwarded and then disables recording.
//! Events arriving while disabled are dropped, end matches included.
//!
//! In nested mode the start/end pairs count depth like parentheses:
//! each start match increments, each end match decrements, and
//! recording stays enabled until depth returns to zero. Non-nested mode
//! is a plain on/off switch.

use std::collections::HashMap;
use std::collections::HashSet;
use std::sync::Mutex;

use regex::Regex;

use crate::error::{Result, TraceError};
use crate::message::SharedMessageSink;
use crate::objectid::ObjRef;
use crate::registry::{DataInfo, MethodInfo};

use super::EventSink;

/// Selects the dataIds that toggle interval recording
pub trait DataIdPredicate: Send + Sync {
    fn matches(&self, data_id: i32) -> bool;
}

/// Predicate over an explicit set of dataIds
pub struct IdSetPredicate {
    ids: HashSet<i32>,
}

impl IdSetPredicate {
    pub fn new(ids: impl IntoIterator<Item = i32>) -> Self {
        Self {
            ids: ids.into_iter().collect(),
        }
    }
}

impl DataIdPredicate for IdSetPredicate {
    fn matches(&self, data_id: i32) -> bool {
        self.ids.contains(&data_id)
    }
}

/// Predicate matching a regular expression against each site's
/// `className#methodName#line` location string
///
/// Locations are resolved once at construction; matching at record time
/// is a set lookup.
pub struct LocationPredicate {
    pattern: Regex,
    matching: HashSet<i32>,
}

impl LocationPredicate {
    /// Compile `pattern` and resolve it against the given metadata
    pub fn new(pattern: &str, data: &[DataInfo], methods: &[MethodInfo]) -> Result<Self> {
        let pattern = Regex::new(pattern).map_err(|e| TraceError::InvalidPattern {
            pattern: pattern.to_string(),
            reason: e.to_string(),
        })?;
        let by_id: HashMap<i32, &MethodInfo> =
            methods.iter().map(|m| (m.method_id, m)).collect();
        let mut matching = HashSet::new();
        for info in data {
            let location = match by_id.get(&info.method_id) {
                Some(method) => format!(
                    "{}#{}#{}",
                    method.class_name, method.method_name, info.line
                ),
                None => continue,
            };
            if pattern.is_match(&location) {
                matching.insert(info.data_id);
            }
        }
        Ok(Self { pattern, matching })
    }

    /// The source pattern
    pub fn pattern(&self) -> &str {
        self.pattern.as_str()
    }

    /// Number of sites the pattern resolved to
    pub fn resolved_count(&self) -> usize {
        self.matching.len()
    }
}

impl DataIdPredicate for LocationPredicate {
    fn matches(&self, data_id: i32) -> bool {
        self.matching.contains(&data_id)
    }
}

/// Sink wrapper that records only between start and end matches
pub struct FilterSink {
    inner: Box<dyn EventSink>,
    start: Box<dyn DataIdPredicate>,
    end: Box<dyn DataIdPredicate>,
    nested: bool,
    /// 0 means disabled; non-nested mode only uses 0 and 1
    depth: Mutex<u32>,
    messages: Option<SharedMessageSink>,
}

impl FilterSink {
    pub fn new(
        inner: Box<dyn EventSink>,
        start: Box<dyn DataIdPredicate>,
        end: Box<dyn DataIdPredicate>,
    ) -> Self {
        Self {
            inner,
            start,
            end,
            nested: false,
            depth: Mutex::new(0),
            messages: None,
        }
    }

    /// Count start/end pairs like parentheses instead of on/off
    pub fn nested(mut self, nested: bool) -> Self {
        self.nested = nested;
        self
    }

    /// Attach a message sink receiving enable/disable transition reports
    pub fn with_message_sink(mut self, sink: SharedMessageSink) -> Self {
        self.messages = Some(sink);
        self
    }

    /// True while recording is enabled
    pub fn enabled(&self) -> bool {
        self.depth.lock().map(|d| *d > 0).unwrap_or(false)
    }

    /// Decide whether to forward the event, updating the interval state
    fn admit(&self, data_id: i32) -> bool {
        let mut depth = match self.depth.lock() {
            Ok(depth) => depth,
            Err(poisoned) => poisoned.into_inner(),
        };
        let was_enabled = *depth > 0;

        if self.start.matches(data_id) {
            if self.nested {
                *depth += 1;
            } else {
                *depth = 1;
            }
            if !was_enabled {
                self.report(data_id, true);
            }
            return true;
        }

        if !was_enabled {
            // End matches while disabled are dropped with everything else
            return false;
        }

        if self.end.matches(data_id) {
            if self.nested {
                *depth = depth.saturating_sub(1);
            } else {
                *depth = 0;
            }
            if *depth == 0 {
                self.report(data_id, false);
            }
            // The closing event itself is still recorded
            return true;
        }

        true
    }

    fn report(&self, data_id: i32, enabled: bool) {
        if let Some(sink) = &self.messages {
            let state = if enabled { "enabled" } else { "disabled" };
            sink.report(&format!("interval recording {} at dataId {}", state, data_id));
        }
    }
}

impl EventSink for FilterSink {
    fn record_raw(&self, data_id: i32, raw_value: i64) {
        if self.admit(data_id) {
            self.inner.record_raw(data_id, raw_value);
        }
    }

    fn record_object(&self, data_id: i32, obj: Option<&ObjRef>) {
        if self.admit(data_id) {
            self.inner.record_object(data_id, obj);
        }
    }

    fn close(&self) {
        self.inner.close();
    }

    fn name(&self) -> &'static str {
        "filter"
    }
}
