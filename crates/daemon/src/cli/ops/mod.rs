pub mod ctl;
pub mod fs;
pub mod health;
pub mod init;
pub mod key;
pub mod mount;
pub mod node;
pub mod repair;
pub mod version;

pub use ctl::Ctl;
pub use fs::Fs;
pub use health::Health;
pub use init::Init;
pub use key::Key;
pub use mount::Mount;
pub use node::Node;
pub use repair::Repair;
pub use version::Version;
