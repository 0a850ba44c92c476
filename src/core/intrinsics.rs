//! PK-004: Restore canonical intrinsic-function keys in YAML-origin templates.
//!
//! The YAML parser keeps CloudFormation short-form tags (`!Ref x`,
//! `!GetAtt a.b`, `!If [...]`) as tagged values. Before a tree leaves the
//! packager every tag is rewritten into its long form (`{Ref: x}`,
//! `{Fn::GetAtt: [a, b]}`, `{Fn::If: [...]}`), recursively.

use super::types::TemplateTree;
use serde_yaml_ng::Mapping;

/// Tags whose long form drops the `Fn::` prefix.
const BARE_KEYS: &[&str] = &["Ref", "Condition"];

/// Tags rewritten to `Fn::<Name>`.
const FN_KEYS: &[&str] = &[
    "And",
    "Base64",
    "Cidr",
    "Equals",
    "FindInMap",
    "ForEach",
    "GetAZs",
    "GetAtt",
    "If",
    "ImportValue",
    "Join",
    "Length",
    "Not",
    "Or",
    "Select",
    "Split",
    "Sub",
    "ToJsonString",
    "Transform",
];

/// Map a short-form tag name to its canonical key. Unknown tags map to `None`.
pub fn canonical_key(tag: &str) -> Option<String> {
    let name = tag.trim_start_matches('!');
    if BARE_KEYS.contains(&name) {
        Some(name.to_string())
    } else if FN_KEYS.contains(&name) {
        Some(format!("Fn::{}", name))
    } else {
        None
    }
}

/// Rewrite every known short-form tag in the tree into its long form.
///
/// Idempotent: a tree without tags is left unchanged.
pub fn restore_intrinsic_keys(tree: &mut TemplateTree) {
    match tree {
        TemplateTree::Mapping(map) => {
            for (_, value) in map.iter_mut() {
                restore_intrinsic_keys(value);
            }
        }
        TemplateTree::Sequence(seq) => {
            for value in seq.iter_mut() {
                restore_intrinsic_keys(value);
            }
        }
        TemplateTree::Tagged(tagged) => {
            let tag = tagged.tag.to_string();
            let mut inner = std::mem::replace(&mut tagged.value, TemplateTree::Null);
            restore_intrinsic_keys(&mut inner);
            match canonical_key(&tag) {
                Some(key) => {
                    let inner = if key == "Fn::GetAtt" {
                        split_get_att(inner)
                    } else {
                        inner
                    };
                    let mut map = Mapping::new();
                    map.insert(TemplateTree::String(key), inner);
                    *tree = TemplateTree::Mapping(map);
                }
                None => tagged.value = inner,
            }
        }
        _ => {}
    }
}

/// `!GetAtt Res.Attr` short form → `[Res, Attr]`; the sequence form is kept.
fn split_get_att(value: TemplateTree) -> TemplateTree {
    match value {
        TemplateTree::String(s) => match s.split_once('.') {
            Some((resource, attribute)) => TemplateTree::Sequence(vec![
                TemplateTree::String(resource.to_string()),
                TemplateTree::String(attribute.to_string()),
            ]),
            None => TemplateTree::String(s),
        },
        other => other,
    }
}
