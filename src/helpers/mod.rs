pub mod bundle;
pub mod cert_cipher;
pub mod mq_manager;

pub use cert_cipher::{CertCipher, CipherError};
pub use mq_manager::{broadcast_json, enqueue_json, MessagePublisher, MqManager};
