//! Processors and ordered processor chains.

use crate::error::ProcessError;
use std::fmt;
use std::sync::Arc;
use transaction_protocol::Message;

/// In-place transformation of a message.
///
/// A processor may rewrite part contents and metadata or remove parts.
/// Removing every part is not an error.
pub trait Processor: Send + Sync {
    fn name(&self) -> &str;

    fn process(&self, message: &mut Message) -> Result<(), ProcessError>;
}

/// Processors applied in order, stopping at the first failure.
#[derive(Clone, Default)]
pub struct ProcessorChain {
    processors: Vec<Arc<dyn Processor>>,
}

impl ProcessorChain {
    pub fn new(processors: Vec<Arc<dyn Processor>>) -> Self {
        Self { processors }
    }

    pub fn push(&mut self, processor: Arc<dyn Processor>) {
        self.processors.push(processor);
    }

    pub fn len(&self) -> usize {
        self.processors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.processors.is_empty()
    }

    pub fn apply(&self, message: &mut Message) -> Result<(), ProcessError> {
        for processor in &self.processors {
            processor.process(message)?;
            if message.is_empty() {
                break;
            }
        }
        Ok(())
    }
}

impl fmt::Debug for ProcessorChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.processors.iter().map(|p| p.name()))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use transaction_protocol::Part;

    struct Suffix(&'static str);

    impl Processor for Suffix {
        fn name(&self) -> &str {
            "suffix"
        }

        fn process(&self, message: &mut Message) -> Result<(), ProcessError> {
            for part in message.iter_mut() {
                let mut data = part.data().to_vec();
                data.extend_from_slice(self.0.as_bytes());
                part.set_data(data);
            }
            Ok(())
        }
    }

    struct DropAll;

    impl Processor for DropAll {
        fn name(&self) -> &str {
            "drop_all"
        }

        fn process(&self, message: &mut Message) -> Result<(), ProcessError> {
            message.retain(|_| false);
            Ok(())
        }
    }

    struct Fail;

    impl Processor for Fail {
        fn name(&self) -> &str {
            "fail"
        }

        fn process(&self, _message: &mut Message) -> Result<(), ProcessError> {
            Err(ProcessError::new("fail", "always"))
        }
    }

    #[test]
    fn test_chain_applies_in_order() {
        let chain = ProcessorChain::new(vec![Arc::new(Suffix("-a")), Arc::new(Suffix("-b"))]);
        let mut message = Message::from(Part::new("x"));
        chain.apply(&mut message).unwrap();
        assert_eq!(message.get(0).unwrap().data(), b"x-a-b");
    }

    #[test]
    fn test_chain_stops_once_empty() {
        let chain = ProcessorChain::new(vec![Arc::new(DropAll), Arc::new(Fail)]);
        let mut message = Message::from(Part::new("x"));
        assert!(chain.apply(&mut message).is_ok());
        assert!(message.is_empty());
    }

    #[test]
    fn test_chain_propagates_failure() {
        let chain = ProcessorChain::new(vec![Arc::new(Fail), Arc::new(Suffix("-a"))]);
        let mut message = Message::from(Part::new("x"));
        let err = chain.apply(&mut message).unwrap_err();
        assert_eq!(err.processor, "fail");
        assert_eq!(message.get(0).unwrap().data(), b"x");
    }

    #[test]
    fn test_debug_lists_names() {
        let chain = ProcessorChain::new(vec![Arc::new(DropAll), Arc::new(Fail)]);
        assert_eq!(format!("{chain:?}"), r#"["drop_all", "fail"]"#);
    }
}
