//! Integration test covering the full record/replay cycle.
//!
//! Weaves a small program's metadata, records a run through the stream
//! sink with file rotation forced on, then replays it: sequential order,
//! O(1) seek, parameter linkage, object identities and call-stack
//! validation all against the same trace directory.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use weavetrace_core::objectid::load_object_types;
use weavetrace_core::reader::{CallStackVerifier, DataIdMap, EventReader};
use weavetrace_core::registry::{
    Attributes, ClassInfo, Descriptor, EventType, MetadataRegistry, WeavingLevel,
};
use weavetrace_core::sink::{EventSink, StreamSink};
use weavetrace_core::{ObjRef, OutputConfig, TracedObject};

struct Greeting(&'static str);

impl TracedObject for Greeting {
    fn type_name(&self) -> &str {
        "java/lang/String"
    }
    fn string_content(&self) -> Option<String> {
        Some(self.0.to_string())
    }
}

fn temp_dir(tag: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!(
        "weavetrace-roundtrip-{}-{}",
        tag,
        std::process::id()
    ));
    let _ = std::fs::remove_dir_all(&dir);
    dir
}

/// One class, two methods.
///
/// `greet(I)Ljava/lang/String;`: data ids 0 reserved, 1 entry, 2 param,
/// 3 normal exit (object-valued).
/// `main`: 4 reserved, 5 entry, 6 call of greet (desc `(I)...`),
/// 7 call param, 8 call return (object-valued), 9 normal exit.
fn weave(dir: &Path) {
    let registry = MetadataRegistry::create(dir).unwrap();
    let mut log = registry.begin_class_weave().unwrap();

    log.start_method(
        "com/example/Greeter",
        "greet",
        "(I)Ljava/lang/String;",
        1,
        Some("Greeter.java"),
    );
    log.next_data_id(5, 0, EventType::MethodEntry, Descriptor::Void, Attributes::new())
        .unwrap();
    log.next_data_id(5, 1, EventType::MethodParam, Descriptor::Int, Attributes::new())
        .unwrap();
    log.next_data_id(7, 9, EventType::MethodNormalExit, Descriptor::Object, Attributes::new())
        .unwrap();

    log.start_method("com/example/Greeter", "main", "([Ljava/lang/String;)V", 9, None);
    log.next_data_id(12, 0, EventType::MethodEntry, Descriptor::Void, Attributes::new())
        .unwrap();
    log.next_data_id(
        14,
        3,
        EventType::Call,
        Descriptor::Void,
        Attributes::from_pairs([("name", "greet"), ("desc", "(I)Ljava/lang/String;")]),
    )
    .unwrap();
    log.next_data_id(14, 4, EventType::CallParam, Descriptor::Int, Attributes::new())
        .unwrap();
    log.next_data_id(14, 8, EventType::CallReturn, Descriptor::Object, Attributes::new())
        .unwrap();
    log.next_data_id(16, 12, EventType::MethodNormalExit, Descriptor::Void, Attributes::new())
        .unwrap();

    let class = ClassInfo {
        class_id: log.class_id(),
        container: "build/classes".to_string(),
        filename: "com/example/Greeter.class".to_string(),
        class_name: "com/example/Greeter".to_string(),
        weaving_level: WeavingLevel::Normal,
        content_hash: ClassInfo::content_hash_of(b"greeter-bytecode"),
        loader_ident: "app-loader".to_string(),
    };
    registry.commit(&class, &log).unwrap();
}

/// Record `main` calling `greet(42)` once. 8 events with rotation at 4
/// records per file, so the stream spans two files.
fn record(dir: &Path) -> i64 {
    let config = OutputConfig::new(dir).events_per_file(4);
    let sink = StreamSink::new(&config).unwrap();
    let greeting: ObjRef = Arc::new(Greeting("hello"));

    sink.record_i64(5, 0); // main entry
    sink.record_i64(6, 0); // call greet
    sink.record_i32(7, 42); // call param
    sink.record_i64(1, 0); // greet entry
    sink.record_i32(2, 42); // method param
    sink.record_object(3, Some(&greeting)); // greet returns the string
    sink.record_object(8, Some(&greeting)); // call return sees the same object
    sink.record_i64(9, 0); // main exit
    sink.close();

    let id = sink.objects().map().id_for(Some(&greeting));
    assert!(id > 0);
    id
}

#[test]
fn test_record_and_replay_round_trip() {
    let dir = temp_dir("full");
    weave(&dir);
    let greeting_id = record(&dir);

    let map = DataIdMap::load(&dir).unwrap();
    assert_eq!(map.class_count(), 1);
    assert_eq!(map.method_count(), 2);
    assert_eq!(map.data_count(), 10);

    let mut reader = EventReader::open(&dir, map.clone()).unwrap();
    assert_eq!(reader.total_events(), 8);

    // main entry, then the call with its single linked param
    let entry = reader.next_event().unwrap().unwrap();
    assert_eq!(entry.event_type, EventType::MethodEntry);
    assert_eq!(map.location_of(entry.data_id).as_deref(), Some("com/example/Greeter#main#12"));

    let call = reader.next_event().unwrap().unwrap();
    assert_eq!(call.event_type, EventType::Call);
    assert_eq!(call.params.len(), 1);
    assert_eq!(call.params[0].raw_value, 42);

    // greet's entry links its parameter from the method descriptor
    let greet_entry = reader.next_event().unwrap().unwrap();
    assert_eq!(greet_entry.event_type, EventType::MethodEntry);
    assert_eq!(greet_entry.params.len(), 1);

    // Both object-valued events resolve to the same surrogate id, and
    // the side table knows its type
    let greet_exit = reader.next_event().unwrap().unwrap();
    let call_return = reader.next_event().unwrap().unwrap();
    assert_eq!(greet_exit.object_id(), Some(greeting_id));
    assert_eq!(call_return.object_id(), Some(greeting_id));
    assert_eq!(map.object_type(greeting_id), Some("java/lang/String"));

    let main_exit = reader.next_event().unwrap().unwrap();
    assert_eq!(main_exit.event_type, EventType::MethodNormalExit);
    assert!(reader.next_event().unwrap().is_none());

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn test_seek_into_rotated_stream() {
    let dir = temp_dir("seek");
    weave(&dir);
    record(&dir);

    let map = DataIdMap::load(&dir).unwrap();
    let mut reader = EventReader::open(&dir, map).unwrap().without_param_linkage();

    // Event 5 lives in the second file (4 records per file)
    reader.seek(5).unwrap();
    let event = reader.next_event().unwrap().unwrap();
    assert_eq!(event.event_id, 5);
    assert_eq!(event.event_type, EventType::MethodNormalExit);

    // And back into the first file
    reader.seek(1).unwrap();
    assert_eq!(reader.next_event().unwrap().unwrap().event_type, EventType::Call);

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn test_replayed_trace_passes_stack_validation() {
    let dir = temp_dir("stack");
    weave(&dir);
    record(&dir);

    let map = DataIdMap::load(&dir).unwrap();
    let mut reader = EventReader::open(&dir, map.clone()).unwrap();
    let mut verifier = CallStackVerifier::new(map);

    let mut threads = std::collections::HashSet::new();
    while let Some(event) = reader.next_event().unwrap() {
        threads.insert(event.thread_id);
        verifier.process_event(&event).unwrap();
        for param in &event.params {
            verifier.process_event(param).unwrap();
        }
    }
    for thread_id in threads {
        assert_eq!(verifier.depth(thread_id), 0);
    }

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn test_string_side_table_round_trip() {
    let dir = temp_dir("strings");
    weave(&dir);
    let greeting_id = record(&dir);

    let types = load_object_types(&dir).unwrap();
    assert_eq!(types.get(&greeting_id).map(String::as_str), Some("java/lang/String"));

    let _ = std::fs::remove_dir_all(&dir);
}
