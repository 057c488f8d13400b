//! Metadata index for replay
//!
//! Loads the three metadata tables and the object-type side table from a
//! trace directory and serves them by id. The tables are dense: row N
//! holds id N, validated on load, so every lookup is a vector index.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use crate::error::{Result, TraceError};
use crate::objectid::load_object_types;
use crate::registry::{
    descriptor_param_count, load_class_table, load_data_table, load_method_table, ClassInfo,
    DataInfo, EventType, MethodInfo,
};

/// Read-only index over a trace directory's metadata
#[derive(Debug)]
pub struct DataIdMap {
    classes: Vec<ClassInfo>,
    methods: Vec<MethodInfo>,
    data: Vec<DataInfo>,
    object_types: HashMap<i64, String>,
}

impl DataIdMap {
    /// Load the metadata tables from `dir`
    pub fn load(dir: &Path) -> Result<Arc<Self>> {
        let classes = load_class_table(dir)?;
        let methods = load_method_table(dir)?;
        let data = load_data_table(dir)?;

        check_dense("classes", classes.iter().map(|c| c.class_id))?;
        check_dense("methods", methods.iter().map(|m| m.method_id))?;
        check_dense("dataids", data.iter().map(|d| d.data_id))?;

        // The side table only exists for runs that recorded objects
        let object_types = load_object_types(dir)?;

        Ok(Arc::new(Self {
            classes,
            methods,
            data,
            object_types,
        }))
    }

    pub fn class(&self, class_id: i32) -> Option<&ClassInfo> {
        usize::try_from(class_id).ok().and_then(|i| self.classes.get(i))
    }

    pub fn method(&self, method_id: i32) -> Option<&MethodInfo> {
        usize::try_from(method_id).ok().and_then(|i| self.methods.get(i))
    }

    pub fn data_info(&self, data_id: i32) -> Option<&DataInfo> {
        usize::try_from(data_id).ok().and_then(|i| self.data.get(i))
    }

    /// The method containing an instrumentation site
    pub fn method_of(&self, info: &DataInfo) -> Option<&MethodInfo> {
        self.method(info.method_id)
    }

    /// The class containing an instrumentation site
    pub fn class_of(&self, info: &DataInfo) -> Option<&ClassInfo> {
        self.class(info.class_id)
    }

    /// Recorded runtime type of an object, by surrogate id
    pub fn object_type(&self, object_id: i64) -> Option<&str> {
        self.object_types.get(&object_id).map(String::as_str)
    }

    pub fn class_count(&self) -> usize {
        self.classes.len()
    }

    pub fn method_count(&self) -> usize {
        self.methods.len()
    }

    pub fn data_count(&self) -> usize {
        self.data.len()
    }

    /// `className#methodName#line` location string for a site
    pub fn location_of(&self, data_id: i32) -> Option<String> {
        let info = self.data_info(data_id)?;
        let method = self.method_of(info)?;
        Some(format!(
            "{}#{}#{}",
            method.class_name, method.method_name, info.line
        ))
    }

    /// Declared parameter count for a site that opens a parameter run
    ///
    /// An explicit `paramcount` attribute wins; otherwise the callee
    /// descriptor is taken from the `desc` attribute (call sites) or
    /// from the containing method (entry sites).
    pub fn declared_param_count(&self, info: &DataInfo) -> usize {
        if let Some(count) = info.attributes.get("paramcount") {
            if let Ok(count) = count.parse::<usize>() {
                return count;
            }
        }
        if let Some(desc) = info.attributes.get("desc") {
            return descriptor_param_count(desc);
        }
        if info.event_type == EventType::MethodEntry {
            if let Some(method) = self.method_of(info) {
                return descriptor_param_count(&method.method_desc);
            }
        }
        0
    }
}

fn check_dense(table: &str, ids: impl Iterator<Item = i32>) -> Result<()> {
    for (index, id) in ids.enumerate() {
        if id as usize != index {
            return Err(TraceError::CorruptMetadata {
                table: table.to_string(),
                reason: format!("row {} holds id {}; ids must be dense", index, id),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{Attributes, MetadataRegistry};
    use std::path::PathBuf;

    fn temp_dir(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "weavetrace-dataidmap-{}-{}",
            tag,
            std::process::id()
        ));
        let _ = std::fs::remove_dir_all(&dir);
        dir
    }

    fn weave_one_class(dir: &Path) {
        use crate::registry::{Descriptor, WeavingLevel};

        let registry = MetadataRegistry::create(dir).unwrap();
        let mut log = registry.begin_class_weave().unwrap();
        let method_id = log.start_method("com/example/Main", "run", "(I)V", 1, Some("Main.java"));
        log.next_data_id(10, 1, EventType::MethodEntry, Descriptor::Void, Attributes::new())
            .unwrap();
        log.next_data_id(
            12,
            4,
            EventType::Call,
            Descriptor::Void,
            Attributes::from_pairs([("desc", "(IJ)V")]),
        )
        .unwrap();
        let class = ClassInfo {
            class_id: log.class_id(),
            container: "build".to_string(),
            filename: "Main.class".to_string(),
            class_name: "com/example/Main".to_string(),
            weaving_level: WeavingLevel::Normal,
            content_hash: ClassInfo::content_hash_of(b"x"),
            loader_ident: "app".to_string(),
        };
        registry.commit(&class, &log).unwrap();
        assert_eq!(method_id, 0);
    }

    #[test]
    fn test_load_and_lookup() {
        let dir = temp_dir("load");
        weave_one_class(&dir);

        let map = DataIdMap::load(&dir).unwrap();
        assert_eq!(map.class_count(), 1);
        assert_eq!(map.method_count(), 1);
        // Slot 0 is the reserved anchor, then entry and call
        assert_eq!(map.data_count(), 3);

        let entry = map.data_info(1).unwrap();
        assert_eq!(entry.event_type, EventType::MethodEntry);
        assert_eq!(
            map.location_of(1).as_deref(),
            Some("com/example/Main#run#10")
        );
        assert!(map.data_info(99).is_none());

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_param_count_resolution() {
        let dir = temp_dir("params");
        weave_one_class(&dir);
        let map = DataIdMap::load(&dir).unwrap();

        // Entry site: count comes from the containing method's descriptor
        let entry = map.data_info(1).unwrap();
        assert_eq!(map.declared_param_count(entry), 1);

        // Call site: count comes from the desc attribute
        let call = map.data_info(2).unwrap();
        assert_eq!(map.declared_param_count(call), 2);

        // Explicit paramcount attribute wins
        let mut override_info = call.clone();
        override_info.attributes.put("paramcount", "5");
        assert_eq!(map.declared_param_count(&override_info), 5);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_non_dense_ids_rejected() {
        let dir = temp_dir("dense");
        weave_one_class(&dir);

        // Corrupt the data table by dropping a middle row
        let path = dir.join(crate::registry::DATA_TABLE_FILE);
        let content = std::fs::read_to_string(&path).unwrap();
        let kept: Vec<&str> = content
            .lines()
            .enumerate()
            .filter(|(i, _)| *i != 2) // header + rows; drop data id 1
            .map(|(_, l)| l)
            .collect();
        std::fs::write(&path, kept.join("\n")).unwrap();

        let err = DataIdMap::load(&dir).unwrap_err();
        assert!(matches!(err, TraceError::CorruptMetadata { .. }));

        let _ = std::fs::remove_dir_all(&dir);
    }
}
