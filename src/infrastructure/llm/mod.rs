//! Provider adapters

mod anthropic;
mod azure_openai;
mod custom;
mod google;
mod http_client;
mod openai;
mod registry;
mod simulated;

pub use anthropic::{AnthropicInvoker, DEFAULT_ANTHROPIC_BASE_URL};
pub use azure_openai::{AzureOpenAiInvoker, DEFAULT_AZURE_API_VERSION};
pub use custom::CustomInvoker;
pub use google::{GoogleInvoker, DEFAULT_GOOGLE_BASE_URL};
pub use http_client::{error_for_status, HttpClient, HttpClientTrait, HttpResponse};
pub use openai::{OpenAiInvoker, DEFAULT_MAX_SEGMENTS, DEFAULT_OPENAI_BASE_URL, MAX_SEGMENTS_CAP};
pub use registry::ProviderRegistry;
pub use simulated::{missing_key_warning, simulated_result, simulated_text};

#[cfg(test)]
pub use http_client::mock;
