//! Module interfaces
//!
//! The stable export surface of a compiled module: export schemes (effect
//! rows preserved verbatim), constructor descriptors, and a deterministic
//! digest. Exports are immutable once the interface is built; the digest
//! is a SHA-256 over sorted, canonically formatted entries, so identical
//! sources always produce identical digests.

use crate::core::GlobalRef;
use crate::types::{Scheme, Type};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// Interface schema tag for user modules
pub const IFACE_SCHEMA: &str = "ailang-iface/1";

/// One exported binding
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IfaceExport {
    /// Generalized type, effect rows intact
    pub scheme: Scheme,
    /// True iff the binding's effect row is empty
    pub purity: bool,
    /// Where the binding lives
    pub global_ref: IfaceRef,
}

/// Serializable `(module, name)` pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IfaceRef {
    /// Owning module
    pub module: String,
    /// Exported name
    pub name: String,
}

impl From<IfaceRef> for GlobalRef {
    fn from(r: IfaceRef) -> Self {
        GlobalRef {
            module: r.module,
            name: r.name,
        }
    }
}

/// One constructor descriptor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IfaceCtor {
    /// Declaring type name
    pub type_name: String,
    /// Constructor name
    pub ctor_name: String,
    /// Number of fields
    pub arity: usize,
    /// Type parameters of the declaring type
    pub type_params: Vec<String>,
    /// Field types, in declaration order
    pub field_types: Vec<Type>,
    /// Result type of the constructor
    pub result_type: Type,
}

/// The stable export surface of a module
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Iface {
    /// Owning module path
    pub module: String,
    /// Schema version tag
    pub schema: String,
    /// Exported bindings, keyed by name
    pub exports: BTreeMap<String, IfaceExport>,
    /// Constructors, keyed by constructor name
    pub constructors: BTreeMap<String, IfaceCtor>,
    /// Deterministic hash of the surface
    pub digest: String,
}

impl Iface {
    /// Build an interface, computing its digest
    pub fn new(
        module: impl Into<String>,
        schema: impl Into<String>,
        exports: BTreeMap<String, IfaceExport>,
        constructors: BTreeMap<String, IfaceCtor>,
    ) -> Self {
        let module = module.into();
        let schema = schema.into();
        let digest = compute_digest(&schema, &exports, &constructors);
        Self {
            module,
            schema,
            exports,
            constructors,
            digest,
        }
    }

    /// Whether the module exports a type with the given name
    pub fn exports_type(&self, name: &str) -> bool {
        self.constructors.values().any(|c| c.type_name == name)
    }

    /// Normalized JSON form with deterministic ordering, as emitted by
    /// `ailang iface`
    pub fn to_normalized_json(&self) -> serde_json::Value {
        let exports: Vec<serde_json::Value> = self
            .exports
            .iter()
            .map(|(name, export)| {
                serde_json::json!({
                    "name": name,
                    "type": export.scheme.canonical(),
                    "purity": export.purity,
                })
            })
            .collect();
        let constructors: Vec<serde_json::Value> = self
            .constructors
            .iter()
            .map(|(name, ctor)| {
                serde_json::json!({
                    "type": ctor.type_name,
                    "ctor": name,
                    "arity": ctor.arity,
                    "fields": ctor
                        .field_types
                        .iter()
                        .map(|t| t.to_string())
                        .collect::<Vec<_>>(),
                })
            })
            .collect();
        serde_json::json!({
            "module": self.module,
            "schema": self.schema,
            "digest": self.digest,
            "exports": exports,
            "constructors": constructors,
        })
    }
}

/// SHA-256 over the schema tag plus sorted canonical entries
fn compute_digest(
    schema: &str,
    exports: &BTreeMap<String, IfaceExport>,
    constructors: &BTreeMap<String, IfaceCtor>,
) -> String {
    let mut hasher = Sha256::new();
    hasher.update(schema.as_bytes());
    hasher.update(b"\n");
    for (name, export) in exports {
        hasher.update(name.as_bytes());
        hasher.update(b"|");
        hasher.update(export.scheme.canonical().as_bytes());
        hasher.update(b"|");
        hasher.update(if export.purity { b"pure" as &[u8] } else { b"effectful" });
        hasher.update(b"\n");
    }
    for (name, ctor) in constructors {
        hasher.update(ctor.type_name.as_bytes());
        hasher.update(b".");
        hasher.update(name.as_bytes());
        hasher.update(b"/");
        hasher.update(ctor.arity.to_string().as_bytes());
        for field in &ctor.field_types {
            hasher.update(b"|");
            hasher.update(field.to_string().as_bytes());
        }
        hasher.update(b"\n");
    }
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::EffectRow;
    use pretty_assertions::assert_eq;

    fn sample_iface() -> Iface {
        let mut exports = BTreeMap::new();
        exports.insert(
            "println".to_string(),
            IfaceExport {
                scheme: Scheme::mono(Type::Func {
                    params: vec![Type::string()],
                    ret: Box::new(Type::unit()),
                    effects: EffectRow::closed(["IO"]),
                }),
                purity: false,
                global_ref: IfaceRef {
                    module: "std/io".into(),
                    name: "println".into(),
                },
            },
        );
        Iface::new("std/io", IFACE_SCHEMA, exports, BTreeMap::new())
    }

    #[test]
    fn test_digest_is_deterministic() {
        assert_eq!(sample_iface().digest, sample_iface().digest);
    }

    #[test]
    fn test_digest_tracks_scheme_changes() {
        let base = sample_iface();
        let mut changed = base.clone();
        let mut export = changed.exports.get("println").unwrap().clone();
        export.scheme = Scheme::mono(Type::Func {
            params: vec![Type::string()],
            ret: Box::new(Type::unit()),
            // Dropping the row must change the digest
            effects: EffectRow::pure(),
        });
        changed.exports.insert("println".to_string(), export);
        let rebuilt = Iface::new(
            changed.module,
            changed.schema,
            changed.exports,
            changed.constructors,
        );
        assert_ne!(base.digest, rebuilt.digest);
    }

    #[test]
    fn test_normalized_json_round_trips() {
        let iface = sample_iface();
        let json = iface.to_normalized_json();
        assert_eq!(json["module"], "std/io");
        assert_eq!(json["exports"][0]["name"], "println");
        assert_eq!(json["exports"][0]["purity"], false);
        assert_eq!(
            json["exports"][0]["type"],
            "(string) -> () ! {IO}"
        );
    }

    #[test]
    fn test_iface_serde_round_trip_preserves_digest() {
        let iface = sample_iface();
        let text = serde_json::to_string(&iface).unwrap();
        let back: Iface = serde_json::from_str(&text).unwrap();
        assert_eq!(iface, back);
        assert_eq!(iface.digest, back.digest);
    }
}
