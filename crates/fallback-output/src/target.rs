//! A fallback target: a processor chain in front of a sink.

use crate::processor::ProcessorChain;
use crate::sink::Sink;
use std::fmt;
use std::sync::Arc;

#[derive(Clone)]
pub struct FallbackTarget {
    label: String,
    processors: ProcessorChain,
    sink: Arc<dyn Sink>,
}

impl FallbackTarget {
    /// Target labelled after its sink, with no processors.
    pub fn new(sink: Arc<dyn Sink>) -> Self {
        Self {
            label: sink.label().to_string(),
            processors: ProcessorChain::default(),
            sink,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn with_processors(mut self, processors: ProcessorChain) -> Self {
        self.processors = processors;
        self
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn processors(&self) -> &ProcessorChain {
        &self.processors
    }

    pub fn sink(&self) -> &Arc<dyn Sink> {
        &self.sink
    }
}

impl fmt::Debug for FallbackTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FallbackTarget")
            .field("label", &self.label)
            .field("processors", &self.processors)
            .field("sink", &self.sink.label())
            .finish()
    }
}
