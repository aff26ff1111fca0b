//! DOM collaborator trait.
//!
//! The sandbox and bridge consume exactly four DOM primitives; the host
//! document tree itself stays on the other side of this trait. `PageDom`
//! is an in-memory implementation used by the driver binary and tests.

use indexmap::IndexMap;

/// Opaque handle to a host DOM node. Ids are only meaningful to the
/// `DomHost` that issued them.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct NodeId(pub u64);

pub trait DomHost: Send {
    fn create_element(&mut self, tag: &str) -> Result<NodeId, String>;
    fn query_selector(&mut self, selector: &str) -> Result<Option<NodeId>, String>;
    fn get_attribute(&self, node: NodeId, name: &str) -> Result<Option<String>, String>;
    fn set_attribute(&mut self, node: NodeId, name: &str, value: &str) -> Result<(), String>;
    fn get_text(&self, node: NodeId) -> Result<String, String>;
    fn set_text(&mut self, node: NodeId, value: &str) -> Result<(), String>;
}

struct PageElement {
    tag: String,
    attributes: IndexMap<String, String>,
    text: String,
}

/// Flat in-memory element store. Selector support is limited to what
/// the glue needs: `#id`, `.class`, and bare tag names, first match in
/// creation order.
#[derive(Default)]
pub struct PageDom {
    elements: Vec<PageElement>,
}

impl PageDom {
    pub fn new() -> Self {
        PageDom::default()
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    fn element(&self, node: NodeId) -> Result<&PageElement, String> {
        self.elements
            .get(node.0 as usize)
            .ok_or_else(|| format!("unknown node id {}", node.0))
    }

    fn element_mut(&mut self, node: NodeId) -> Result<&mut PageElement, String> {
        self.elements
            .get_mut(node.0 as usize)
            .ok_or_else(|| format!("unknown node id {}", node.0))
    }
}

impl DomHost for PageDom {
    fn create_element(&mut self, tag: &str) -> Result<NodeId, String> {
        if tag.is_empty() {
            return Err("empty tag name".to_string());
        }
        let id = NodeId(self.elements.len() as u64);
        self.elements.push(PageElement {
            tag: tag.to_ascii_lowercase(),
            attributes: IndexMap::new(),
            text: String::new(),
        });
        Ok(id)
    }

    fn query_selector(&mut self, selector: &str) -> Result<Option<NodeId>, String> {
        if selector.is_empty() {
            return Err("empty selector".to_string());
        }
        let found = if let Some(id) = selector.strip_prefix('#') {
            self.elements
                .iter()
                .position(|e| e.attributes.get("id").is_some_and(|v| v == id))
        } else if let Some(class) = selector.strip_prefix('.') {
            self.elements.iter().position(|e| {
                e.attributes
                    .get("class")
                    .is_some_and(|v| v.split_whitespace().any(|c| c == class))
            })
        } else {
            let tag = selector.to_ascii_lowercase();
            self.elements.iter().position(|e| e.tag == tag)
        };
        Ok(found.map(|index| NodeId(index as u64)))
    }

    fn get_attribute(&self, node: NodeId, name: &str) -> Result<Option<String>, String> {
        Ok(self.element(node)?.attributes.get(name).cloned())
    }

    fn set_attribute(&mut self, node: NodeId, name: &str, value: &str) -> Result<(), String> {
        self.element_mut(node)?
            .attributes
            .insert(name.to_string(), value.to_string());
        Ok(())
    }

    fn get_text(&self, node: NodeId) -> Result<String, String> {
        Ok(self.element(node)?.text.clone())
    }

    fn set_text(&mut self, node: NodeId, value: &str) -> Result<(), String> {
        self.element_mut(node)?.text = value.to_string();
        Ok(())
    }
}
