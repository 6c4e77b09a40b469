//! Built-in processors.

use crate::config::{MetadataOperator, ProcessorConfig, TextOperator};
use crate::error::PipelineResult;
use crate::interpolation::InterpolatedString;
use fallback_output::{ProcessError, Processor, ProcessorChain};
use std::sync::Arc;
use transaction_protocol::{Message, Part};

pub fn build_processor(config: &ProcessorConfig) -> PipelineResult<Arc<dyn Processor>> {
    let processor: Arc<dyn Processor> = match config {
        ProcessorConfig::Text { operator, value } => Arc::new(TextProcessor {
            operator: *operator,
            value: InterpolatedString::parse(value)?,
        }),
        ProcessorConfig::Metadata {
            operator,
            key,
            value,
        } => Arc::new(MetadataProcessor {
            operator: *operator,
            key: key.clone(),
            value: InterpolatedString::parse(value)?,
        }),
        ProcessorConfig::Filter { value, invert } => Arc::new(FilterProcessor {
            needle: value.as_bytes().to_vec(),
            invert: *invert,
        }),
    };
    Ok(processor)
}

pub fn build_chain(configs: &[ProcessorConfig]) -> PipelineResult<ProcessorChain> {
    let processors = configs
        .iter()
        .map(build_processor)
        .collect::<PipelineResult<Vec<_>>>()?;
    Ok(ProcessorChain::new(processors))
}

/// Rewrites part contents.
///
/// `value` is rendered once per part for the operators that use it.
pub struct TextProcessor {
    operator: TextOperator,
    value: InterpolatedString,
}

impl TextProcessor {
    fn apply(&self, part: &mut Part) {
        let data = match self.operator {
            TextOperator::Prepend => {
                let mut data = self.value.render(part).into_bytes();
                data.extend_from_slice(part.data());
                data
            }
            TextOperator::Append => {
                let mut data = part.data().to_vec();
                data.extend_from_slice(self.value.render(part).as_bytes());
                data
            }
            TextOperator::Set => self.value.render(part).into_bytes(),
            TextOperator::ToUpper => part.data().to_ascii_uppercase(),
            TextOperator::ToLower => part.data().to_ascii_lowercase(),
            TextOperator::Trim => part.data().trim_ascii().to_vec(),
        };
        part.set_data(data);
    }
}

impl Processor for TextProcessor {
    fn name(&self) -> &str {
        "text"
    }

    fn process(&self, message: &mut Message) -> Result<(), ProcessError> {
        for part in message.iter_mut() {
            self.apply(part);
        }
        Ok(())
    }
}

/// Sets or deletes one metadata key on every part.
pub struct MetadataProcessor {
    operator: MetadataOperator,
    key: String,
    value: InterpolatedString,
}

impl Processor for MetadataProcessor {
    fn name(&self) -> &str {
        "metadata"
    }

    fn process(&self, message: &mut Message) -> Result<(), ProcessError> {
        for part in message.iter_mut() {
            match self.operator {
                MetadataOperator::Set => {
                    let value = self.value.render(part);
                    part.set_metadata(self.key.clone(), value);
                }
                MetadataOperator::Delete => {
                    part.remove_metadata(&self.key);
                }
            }
        }
        Ok(())
    }
}

/// Keeps the parts whose content contains a byte sequence.
pub struct FilterProcessor {
    needle: Vec<u8>,
    invert: bool,
}

impl FilterProcessor {
    fn matches(&self, data: &[u8]) -> bool {
        self.needle.is_empty() || data.windows(self.needle.len()).any(|w| w == self.needle)
    }
}

impl Processor for FilterProcessor {
    fn name(&self) -> &str {
        "filter"
    }

    fn process(&self, message: &mut Message) -> Result<(), ProcessError> {
        message.retain(|part| self.matches(part.data()) != self.invert);
        Ok(())
    }
}
