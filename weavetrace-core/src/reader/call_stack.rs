//! Call-stack protocol validation during replay
//!
//! A well-formed trace nests entry/exit and call/return like
//! parentheses, per thread. One tolerated exception: a constructor
//! frame (`<init>`) can be left dangling when its body never completed
//! normally, because the runtime unwinds it without emitting an exit.
//! Close events silently discard dangling constructor frames on their
//! way down the stack; any other mismatch is a
//! [`ProtocolViolation`](crate::TraceError::ProtocolViolation).
//!
//! A catch event marks the handler that stopped an unwind: it discards
//! dangling constructor frames down to the nearest enclosing frame and,
//! when that frame is a call site (the call raised), discards it too.

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{Result, TraceError};
use crate::registry::EventType;

use super::data_id_map::DataIdMap;
use super::event::Event;

/// One open frame on a replayed thread's stack
#[derive(Debug, Clone)]
pub struct Frame {
    /// The opening event (method entry or call)
    pub event_id: u64,
    pub data_id: i32,
    pub method_id: i32,
    pub event_type: EventType,
    /// True when the frame belongs to a constructor and may dangle
    pub constructor: bool,
}

#[derive(Debug, Default)]
struct ThreadState {
    stack: Vec<Frame>,
}

/// Per-thread call-stack validator
///
/// Feed it every event in stream order; it maintains one stack per
/// thread and reports the first protocol violation it sees.
pub struct CallStackVerifier {
    map: Arc<DataIdMap>,
    threads: HashMap<i32, ThreadState>,
}

impl CallStackVerifier {
    pub fn new(map: Arc<DataIdMap>) -> Self {
        Self {
            map,
            threads: HashMap::new(),
        }
    }

    /// Current stack depth of a thread
    pub fn depth(&self, thread_id: i32) -> usize {
        self.threads
            .get(&thread_id)
            .map(|t| t.stack.len())
            .unwrap_or(0)
    }

    /// The open frames of a thread, outermost first
    pub fn open_frames(&self, thread_id: i32) -> &[Frame] {
        self.threads
            .get(&thread_id)
            .map(|t| t.stack.as_slice())
            .unwrap_or(&[])
    }

    /// Process one event, updating the owning thread's stack
    pub fn process_event(&mut self, event: &Event) -> Result<()> {
        if event.event_type.opens_frame() {
            let frame = self.frame_of(event);
            self.threads
                .entry(event.thread_id)
                .or_default()
                .stack
                .push(frame);
            return Ok(());
        }
        if event.event_type.closes_frame() {
            return self.close(event);
        }
        if event.event_type == EventType::Catch {
            return self.catch(event);
        }
        Ok(())
    }

    fn frame_of(&self, event: &Event) -> Frame {
        let info = self.map.data_info(event.data_id);
        let constructor = match event.event_type {
            // An entry frame is a constructor when its own method is
            // <init>; a call frame when the callee is
            EventType::MethodEntry => info
                .and_then(|i| self.map.method_of(i))
                .map(|m| m.is_constructor())
                .unwrap_or(false),
            EventType::Call => info
                .and_then(|i| i.attributes.get("name"))
                .map(|name| name == "<init>")
                .unwrap_or(false),
            _ => false,
        };
        Frame {
            event_id: event.event_id,
            data_id: event.data_id,
            method_id: info.map(|i| i.method_id).unwrap_or(-1),
            event_type: event.event_type,
            constructor,
        }
    }

    fn close(&mut self, event: &Event) -> Result<()> {
        let method_id = self
            .map
            .data_info(event.data_id)
            .map(|i| i.method_id)
            .unwrap_or(-1);
        let state = self.threads.entry(event.thread_id).or_default();

        while let Some(top) = state.stack.pop() {
            if event.event_type.matches_open(top.event_type) && top.method_id == method_id {
                return Ok(());
            }
            if !top.constructor {
                return Err(TraceError::ProtocolViolation {
                    thread_id: event.thread_id,
                    event_id: event.event_id,
                    reason: format!(
                        "{} does not close the open {} frame from event {}",
                        event.event_type, top.event_type, top.event_id
                    ),
                });
            }
            // Dangling constructor frame, discarded silently
        }
        Err(TraceError::ProtocolViolation {
            thread_id: event.thread_id,
            event_id: event.event_id,
            reason: format!("{} with no open frame", event.event_type),
        })
    }

    fn catch(&mut self, event: &Event) -> Result<()> {
        let state = self.threads.entry(event.thread_id).or_default();

        // Unwind dangling constructor frames down to the frame that was
        // executing when the exception surfaced
        while let Some(top) = state.stack.last() {
            if top.constructor && top.event_type == EventType::MethodEntry {
                state.stack.pop();
                continue;
            }
            break;
        }
        // If the enclosing frame is a call site, the call itself raised
        // and will never see its return
        if let Some(top) = state.stack.last() {
            if top.event_type == EventType::Call {
                state.stack.pop();
            }
        }
        Ok(())
    }
}
