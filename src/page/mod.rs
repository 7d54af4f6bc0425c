//! In-memory [`Page`] built from fetched or hand-written HTML.
//!
//! `HtmlPage` has no script engine. Host behaviour (a total that drops when a
//! code is applied, a "Remove" link that restores it) is modelled with
//! reactions registered per element and event, each of which edits the
//! [`Document`] directly.

mod document;
mod fetch;

pub use document::Document;
pub use fetch::PageFetcher;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::{RwLock, RwLockReadGuard, mpsc};
use tracing::debug;

use crate::traits::{ElementHandle, ElementQuery, ElementSnapshot, Page};
use crate::watch::DomMutation;

#[derive(Debug, Error)]
pub enum PageError {
    #[error("element {0} is detached from the document")]
    Detached(ElementHandle),

    #[error("page binding failed: {0}")]
    Binding(String),
}

/// DOM events a reaction can be bound to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PageEvent {
    Input,
    Change,
    Click,
}

type Reaction = Arc<dyn Fn(&mut Document) + Send + Sync>;

pub struct HtmlPage {
    url: String,
    document: RwLock<Document>,
    reactions: HashMap<(ElementHandle, PageEvent), Vec<Reaction>>,
    mutations: Option<mpsc::UnboundedSender<DomMutation>>,
}

impl HtmlPage {
    pub fn parse(url: impl Into<String>, html: &str) -> Self {
        Self {
            url: url.into(),
            document: RwLock::new(Document::parse(html)),
            reactions: HashMap::new(),
            mutations: None,
        }
    }

    /// Direct access while the page is still exclusively owned
    pub fn document_mut(&mut self) -> &mut Document {
        self.document.get_mut()
    }

    pub async fn document(&self) -> RwLockReadGuard<'_, Document> {
        self.document.read().await
    }

    /// Run `reaction` whenever `event` fires on `element`
    pub fn on<F>(&mut self, element: ElementHandle, event: PageEvent, reaction: F)
    where
        F: Fn(&mut Document) + Send + Sync + 'static,
    {
        self.reactions
            .entry((element, event))
            .or_default()
            .push(Arc::new(reaction));
    }

    pub fn on_click<F>(&mut self, element: ElementHandle, reaction: F)
    where
        F: Fn(&mut Document) + Send + Sync + 'static,
    {
        self.on(element, PageEvent::Click, reaction);
    }

    /// Feed of DOM mutations, for a watch scheduler
    pub fn subscribe_mutations(&mut self) -> mpsc::UnboundedReceiver<DomMutation> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.document.get_mut().take_mutations();
        self.mutations = Some(tx);
        rx
    }

    /// Edit the shared document, as a host script would
    pub async fn edit<R>(&self, edit: impl FnOnce(&mut Document) -> R) -> R {
        let mut document = self.document.write().await;
        let result = edit(&mut document);
        self.flush(&mut document);
        result
    }

    fn fire(&self, document: &mut Document, element: ElementHandle, event: PageEvent) {
        if let Some(reactions) = self.reactions.get(&(element, event)) {
            for reaction in reactions {
                reaction(document);
            }
        }
    }

    fn flush(&self, document: &mut Document) {
        let mutations = document.take_mutations();
        if let Some(tx) = &self.mutations {
            for mutation in mutations {
                // Receiver gone means nobody is watching anymore
                let _ = tx.send(mutation);
            }
        }
    }
}

#[async_trait]
impl Page for HtmlPage {
    async fn url(&self) -> String {
        self.url.clone()
    }

    async fn visible_text(&self) -> String {
        self.document.read().await.visible_text()
    }

    async fn query(&self, query: ElementQuery) -> Vec<ElementHandle> {
        self.document.read().await.query(query)
    }

    async fn describe(&self, element: ElementHandle) -> Option<ElementSnapshot> {
        self.document.read().await.snapshot(element)
    }

    async fn is_attached(&self, element: ElementHandle) -> bool {
        self.document.read().await.is_attached(element)
    }

    async fn set_value(&self, element: ElementHandle, value: &str) -> Result<(), PageError> {
        let mut document = self.document.write().await;
        if !document.set_value(element, value) {
            return Err(PageError::Detached(element));
        }
        self.fire(&mut document, element, PageEvent::Input);
        self.fire(&mut document, element, PageEvent::Change);
        self.flush(&mut document);
        Ok(())
    }

    async fn click(&self, element: ElementHandle) -> Result<(), PageError> {
        let mut document = self.document.write().await;
        if !document.is_attached(element) {
            return Err(PageError::Detached(element));
        }
        document.record_click(element);
        if !self.reactions.contains_key(&(element, PageEvent::Click)) {
            debug!("Click on {} has no bound reaction", element);
        }
        self.fire(&mut document, element, PageEvent::Click);
        self.flush(&mut document);
        Ok(())
    }
}
