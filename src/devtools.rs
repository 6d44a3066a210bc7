//! Mount a debug panel that mirrors a signal.
//!
//! The panel is rendered into a root node of the thread's installed
//! [`Document`]. Without an installed document, mounting does nothing.

use crate::effect::Effect;
use crate::handle::SignalRead;
use serde::Serialize;
use serde_json::{json, Value};
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

/// Prefix of the id given to devtool root nodes.
pub const DEVTOOLS_ROOT_PREFIX: &str = "signal-devtools-";

/// A node in a [`Document`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(pub u64);

/// What a devtool root is asked to render.
#[derive(Debug, Clone, PartialEq)]
pub struct DevtoolPanel {
    pub display_name: String,
    /// The signal's value if it serializes to an object, otherwise
    /// `{"state": value}`.
    pub props: Value,
}

/// A render target created by [`Document::create_root`].
pub trait DevtoolRoot {
    fn render(&self, panel: DevtoolPanel);
}

/// The document a devtool mounts into.
pub trait Document {
    fn element_by_id(&self, id: &str) -> Option<NodeId>;

    fn create_element(&self, id: &str) -> NodeId;

    fn append_to_body(&self, node: NodeId);

    fn create_root(&self, node: NodeId) -> Rc<dyn DevtoolRoot>;
}

thread_local! {
    static DOCUMENT: RefCell<Option<Rc<dyn Document>>> = const { RefCell::new(None) };
}

/// Install the document devtools mount into on this thread.
pub fn install_document(document: Rc<dyn Document>) {
    DOCUMENT.with(|current| *current.borrow_mut() = Some(document));
}

/// Remove the installed document. Later mounts are no-ops.
pub fn uninstall_document() -> Option<Rc<dyn Document>> {
    DOCUMENT.with(|current| current.borrow_mut().take())
}

fn document() -> Option<Rc<dyn Document>> {
    DOCUMENT.with(|current| current.borrow().clone())
}

/// Mount a devtool panel for `store` named `name`.
///
/// The panel is rendered into `root`, or into a node with id
/// `signal-devtools-{name}` that is created and appended to the body when it
/// does not exist yet. The panel re-renders on every change of the signal.
/// Returns the rendering effect, or `None` when no document is installed.
pub fn mount_store_devtool<S, T>(name: &str, store: &S, root: Option<NodeId>) -> Option<Effect>
where
    S: SignalRead<T> + Clone + 'static,
    T: Serialize + 'static,
{
    let Some(document) = document() else {
        tracing::debug!(store = name, "no document installed; devtool not mounted");
        return None;
    };

    let node = root.unwrap_or_else(|| {
        let id = format!("{DEVTOOLS_ROOT_PREFIX}{name}");
        document.element_by_id(&id).unwrap_or_else(|| {
            let node = document.create_element(&id);
            document.append_to_body(node);
            node
        })
    });
    let devtool = document.create_root(node);
    let display_name = format!("(({name})) devtool");
    let store = store.clone();
    tracing::debug!(store = name, ?node, "mounted devtool");

    Some(Effect::new(move || {
        let value = store.read();
        match panel_props(&value) {
            Ok(Value::Null) => {}
            Ok(props) => devtool.render(DevtoolPanel {
                display_name: display_name.clone(),
                props,
            }),
            Err(error) => tracing::error!(%display_name, %error, "failed to serialize signal for devtool"),
        }
    }))
}

fn panel_props<T: Serialize>(value: &T) -> Result<Value, serde_json::Error> {
    Ok(match serde_json::to_value(value)? {
        object @ (Value::Object(_) | Value::Array(_) | Value::Null) => object,
        state => json!({ "state": state }),
    })
}

/// A document that keeps everything in memory.
///
/// Useful for tests and for headless tools that only want to log what the
/// devtools would show.
#[derive(Clone, Default)]
pub struct HeadlessDocument {
    inner: Rc<RefCell<HeadlessState>>,
}

#[derive(Default)]
struct HeadlessState {
    next_node: u64,
    ids: HashMap<String, NodeId>,
    body: Vec<NodeId>,
    renders: HashMap<NodeId, Vec<DevtoolPanel>>,
}

impl HeadlessDocument {
    pub fn new() -> Self {
        Self::default()
    }

    /// Nodes appended to the body, in order.
    pub fn body(&self) -> Vec<NodeId> {
        self.inner.borrow().body.clone()
    }

    /// Every panel rendered into `node`, oldest first.
    pub fn renders(&self, node: NodeId) -> Vec<DevtoolPanel> {
        self.inner
            .borrow()
            .renders
            .get(&node)
            .cloned()
            .unwrap_or_default()
    }

    /// The panel currently shown in `node`.
    pub fn current(&self, node: NodeId) -> Option<DevtoolPanel> {
        self.inner
            .borrow()
            .renders
            .get(&node)
            .and_then(|renders| renders.last().cloned())
    }
}

impl Document for HeadlessDocument {
    fn element_by_id(&self, id: &str) -> Option<NodeId> {
        self.inner.borrow().ids.get(id).copied()
    }

    fn create_element(&self, id: &str) -> NodeId {
        let mut state = self.inner.borrow_mut();
        let node = NodeId(state.next_node);
        state.next_node += 1;
        state.ids.insert(id.to_owned(), node);
        node
    }

    fn append_to_body(&self, node: NodeId) {
        self.inner.borrow_mut().body.push(node);
    }

    fn create_root(&self, node: NodeId) -> Rc<dyn DevtoolRoot> {
        Rc::new(HeadlessRoot {
            node,
            document: self.clone(),
        })
    }
}

struct HeadlessRoot {
    node: NodeId,
    document: HeadlessDocument,
}

impl DevtoolRoot for HeadlessRoot {
    fn render(&self, panel: DevtoolPanel) {
        tracing::info!(node = self.node.0, panel = %panel.display_name, props = %panel.props, "devtool render");
        self.document
            .inner
            .borrow_mut()
            .renders
            .entry(self.node)
            .or_default()
            .push(panel);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{create_computed, create_signal, create_signal_fn};

    fn install() -> HeadlessDocument {
        let document = HeadlessDocument::new();
        install_document(Rc::new(document.clone()));
        document
    }

    #[test]
    fn test_no_document_is_a_no_op() {
        uninstall_document();
        let count = create_signal(0);
        assert!(mount_store_devtool("count", &count, None).is_none());
    }

    #[test]
    fn test_scalar_values_are_wrapped_in_state() {
        let document = install();
        let count = create_signal(1);
        mount_store_devtool("count", &count, None).unwrap();

        let node = document
            .element_by_id("signal-devtools-count")
            .unwrap();
        assert_eq!(document.body(), vec![node]);

        count.set(2);
        let props: Vec<Value> = document.renders(node).into_iter().map(|panel| panel.props).collect();
        assert_eq!(props, vec![json!({"state": 1}), json!({"state": 2})]);
        assert_eq!(document.current(node).unwrap().display_name, "((count)) devtool");
    }

    #[test]
    fn test_objects_are_rendered_as_is() {
        #[derive(Serialize, Clone, PartialEq)]
        struct Todo {
            title: String,
            done: bool,
        }

        let document = install();
        let todo = create_signal_fn(Todo {
            title: "write docs".into(),
            done: false,
        });
        mount_store_devtool("todo", &todo, None).unwrap();
        let node = document.element_by_id("signal-devtools-todo").unwrap();
        assert_eq!(
            document.current(node).unwrap().props,
            json!({"title": "write docs", "done": false})
        );
    }

    #[test]
    fn test_existing_root_is_reused() {
        let document = install();
        let existing = document.create_element("signal-devtools-shared");
        let a = create_signal(1);
        let b = create_computed(move || a.get() * 10);

        mount_store_devtool("shared", &a, None).unwrap();
        mount_store_devtool("shared", &b, None).unwrap();

        assert!(document.body().is_empty());
        assert_eq!(document.renders(existing).len(), 2);
    }

    #[test]
    fn test_explicit_root_and_stop() {
        let document = install();
        let root = document.create_element("custom");
        let count = create_signal(0);
        let effect = mount_store_devtool("count", &count, Some(root)).unwrap();

        effect.stop();
        count.set(1);
        assert_eq!(document.renders(root).len(), 1);
        assert!(document.element_by_id("signal-devtools-count").is_none());
    }
}
