//! Instrumentation site categories
//!
//! Every instrumentation site carries exactly one [`EventType`]. The set
//! is closed: the weaving component never invents new categories at run
//! time, and the reader dispatches on them during replay.

use serde::{Deserialize, Serialize};

use crate::error::TraceError;

/// Category of an instrumentation site
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    /// Slot 0 of every method; anchors method metadata, carries no event
    Reserved,

    // Method lifecycle
    MethodEntry,
    MethodParam,
    MethodNormalExit,
    MethodExceptionalExit,

    // Call sites
    Call,
    CallParam,
    CallReturn,
    InvokeDynamic,
    InvokeDynamicParam,
    InvokeDynamicResult,

    // Field access
    GetInstanceField,
    GetStaticField,
    PutInstanceField,
    /// Instance field write occurring before the superclass constructor
    /// has run; the owner object has no surrogate id yet
    PutInstanceFieldBeforeInit,
    PutStaticField,

    // Arrays
    ArrayLoad,
    ArrayLoadIndex,
    ArrayLoadResult,
    ArrayStore,
    ArrayStoreIndex,
    ArrayStoreValue,
    ArrayLength,
    ArrayLengthResult,
    MultiNewArray,
    MultiNewArrayContents,

    // Synchronization
    MonitorEnter,
    MonitorExit,

    // Object construction
    NewObject,
    NewObjectCreated,
    ObjectInitialized,

    // Values and operators
    ConstantLoad,
    InstanceOf,
    InstanceOfResult,
    LocalLoad,
    LocalStore,
    LocalIncrement,
    Divide,

    // Control-flow bookkeeping for exception-handler recovery
    Label,
    Jump,
    Catch,
    Throw,
}

impl EventType {
    /// Get the string representation used in the data-id table
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::Reserved => "reserved",
            EventType::MethodEntry => "method.entry",
            EventType::MethodParam => "method.param",
            EventType::MethodNormalExit => "method.exit.normal",
            EventType::MethodExceptionalExit => "method.exit.exceptional",
            EventType::Call => "call",
            EventType::CallParam => "call.param",
            EventType::CallReturn => "call.return",
            EventType::InvokeDynamic => "invoke.dynamic",
            EventType::InvokeDynamicParam => "invoke.dynamic.param",
            EventType::InvokeDynamicResult => "invoke.dynamic.result",
            EventType::GetInstanceField => "field.get.instance",
            EventType::GetStaticField => "field.get.static",
            EventType::PutInstanceField => "field.put.instance",
            EventType::PutInstanceFieldBeforeInit => "field.put.instance.before_init",
            EventType::PutStaticField => "field.put.static",
            EventType::ArrayLoad => "array.load",
            EventType::ArrayLoadIndex => "array.load.index",
            EventType::ArrayLoadResult => "array.load.result",
            EventType::ArrayStore => "array.store",
            EventType::ArrayStoreIndex => "array.store.index",
            EventType::ArrayStoreValue => "array.store.value",
            EventType::ArrayLength => "array.length",
            EventType::ArrayLengthResult => "array.length.result",
            EventType::MultiNewArray => "array.new.multi",
            EventType::MultiNewArrayContents => "array.new.multi.contents",
            EventType::MonitorEnter => "monitor.enter",
            EventType::MonitorExit => "monitor.exit",
            EventType::NewObject => "object.new",
            EventType::NewObjectCreated => "object.created",
            EventType::ObjectInitialized => "object.initialized",
            EventType::ConstantLoad => "constant.load",
            EventType::InstanceOf => "instanceof",
            EventType::InstanceOfResult => "instanceof.result",
            EventType::LocalLoad => "local.load",
            EventType::LocalStore => "local.store",
            EventType::LocalIncrement => "local.increment",
            EventType::Divide => "divide",
            EventType::Label => "label",
            EventType::Jump => "jump",
            EventType::Catch => "catch",
            EventType::Throw => "throw",
        }
    }

    /// The sub-event type carrying this event's parameters, if any
    ///
    /// Parameter linkage on the reader side consumes records of this type
    /// immediately after the base event, on the same thread.
    pub fn parameter_event(&self) -> Option<EventType> {
        match self {
            EventType::MethodEntry => Some(EventType::MethodParam),
            EventType::Call => Some(EventType::CallParam),
            EventType::InvokeDynamic => Some(EventType::InvokeDynamicParam),
            _ => None,
        }
    }

    /// True for events that open a call-stack frame during replay
    pub fn opens_frame(&self) -> bool {
        matches!(self, EventType::MethodEntry | EventType::Call)
    }

    /// True for events that close a call-stack frame during replay
    pub fn closes_frame(&self) -> bool {
        matches!(
            self,
            EventType::MethodNormalExit
                | EventType::MethodExceptionalExit
                | EventType::CallReturn
        )
    }

    /// True if this close event matches a frame opened by `open`
    pub fn matches_open(&self, open: EventType) -> bool {
        match self {
            EventType::MethodNormalExit | EventType::MethodExceptionalExit => {
                open == EventType::MethodEntry
            }
            EventType::CallReturn => open == EventType::Call,
            _ => false,
        }
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for EventType {
    type Err = TraceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "reserved" => Ok(EventType::Reserved),
            "method.entry" => Ok(EventType::MethodEntry),
            "method.param" => Ok(EventType::MethodParam),
            "method.exit.normal" => Ok(EventType::MethodNormalExit),
            "method.exit.exceptional" => Ok(EventType::MethodExceptionalExit),
            "call" => Ok(EventType::Call),
            "call.param" => Ok(EventType::CallParam),
            "call.return" => Ok(EventType::CallReturn),
            "invoke.dynamic" => Ok(EventType::InvokeDynamic),
            "invoke.dynamic.param" => Ok(EventType::InvokeDynamicParam),
            "invoke.dynamic.result" => Ok(EventType::InvokeDynamicResult),
            "field.get.instance" => Ok(EventType::GetInstanceField),
            "field.get.static" => Ok(EventType::GetStaticField),
            "field.put.instance" => Ok(EventType::PutInstanceField),
            "field.put.instance.before_init" => Ok(EventType::PutInstanceFieldBeforeInit),
            "field.put.static" => Ok(EventType::PutStaticField),
            "array.load" => Ok(EventType::ArrayLoad),
            "array.load.index" => Ok(EventType::ArrayLoadIndex),
            "array.load.result" => Ok(EventType::ArrayLoadResult),
            "array.store" => Ok(EventType::ArrayStore),
            "array.store.index" => Ok(EventType::ArrayStoreIndex),
            "array.store.value" => Ok(EventType::ArrayStoreValue),
            "array.length" => Ok(EventType::ArrayLength),
            "array.length.result" => Ok(EventType::ArrayLengthResult),
            "array.new.multi" => Ok(EventType::MultiNewArray),
            "array.new.multi.contents" => Ok(EventType::MultiNewArrayContents),
            "monitor.enter" => Ok(EventType::MonitorEnter),
            "monitor.exit" => Ok(EventType::MonitorExit),
            "object.new" => Ok(EventType::NewObject),
            "object.created" => Ok(EventType::NewObjectCreated),
            "object.initialized" => Ok(EventType::ObjectInitialized),
            "constant.load" => Ok(EventType::ConstantLoad),
            "instanceof" => Ok(EventType::InstanceOf),
            "instanceof.result" => Ok(EventType::InstanceOfResult),
            "local.load" => Ok(EventType::LocalLoad),
            "local.store" => Ok(EventType::LocalStore),
            "local.increment" => Ok(EventType::LocalIncrement),
            "divide" => Ok(EventType::Divide),
            "label" => Ok(EventType::Label),
            "jump" => Ok(EventType::Jump),
            "catch" => Ok(EventType::Catch),
            "throw" => Ok(EventType::Throw),
            _ => Err(TraceError::InvalidEventType {
                name: s.to_string(),
            }),
        }
    }
}
