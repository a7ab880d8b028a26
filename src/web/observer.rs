//! `MutationObserver` as a [`MutationSource`]

use js_sys::Array;
use wasm_bindgen::JsCast;
use web_sys::{MutationObserverInit, Node, NodeList};

use crate::dom::{MutationRecord, MutationSource};

use super::dom::WebDom;

fn nodes(list: &NodeList) -> Vec<Node> {
    (0..list.length()).filter_map(|i| list.item(i)).collect()
}

fn convert(record: &web_sys::MutationRecord) -> Option<MutationRecord<Node>> {
    let target = record.target()?;
    match record.type_().as_str() {
        "childList" => Some(MutationRecord::ChildList {
            target,
            added: nodes(&record.added_nodes()),
            removed: nodes(&record.removed_nodes()),
        }),
        "characterData" => Some(MutationRecord::CharacterData { target }),
        _ => None,
    }
}

/// Convert the record array handed to an observer callback
pub fn convert_records(records: &Array) -> Vec<MutationRecord<Node>> {
    records
        .iter()
        .filter_map(|r| r.dyn_into::<web_sys::MutationRecord>().ok())
        .filter_map(|r| convert(&r))
        .collect()
}

impl MutationSource<Node> for WebDom {
    fn observe(&mut self, root: &Node) {
        let options = MutationObserverInit::new();
        options.set_child_list(true);
        options.set_character_data(true);
        options.set_subtree(true);
        match self.observer.observe_with_options(root, &options) {
            Ok(()) => self.observing = true,
            Err(e) => tracing::error!("Failed to observe page mutations: {:?}", e),
        }
    }

    fn disconnect(&mut self) {
        self.observer.disconnect();
        self.observing = false;
    }

    fn is_observing(&self) -> bool {
        self.observing
    }

    fn take_records(&mut self) -> Vec<MutationRecord<Node>> {
        convert_records(&self.observer.take_records())
    }
}
