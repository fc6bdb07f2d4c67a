//! Client connections to signalling endpoints.
//!
//! [`connect`] opens a TCP stream, performs the opening handshake and hands
//! back a [`Connection`] in the `Open` state.
//!
//! ## Connection Lifecycle
//!
//! 1. **Connecting** - handshake in progress
//! 2. **Open** - handshake accepted
//! 3. **Closing** - close frame sent, waiting for the peer's
//! 4. **Closed** - close handshake done or stream ended
//!
//! ## Example
//!
//! ```rust,no_run
//! use sigprobe::{CloseCode, Config, Endpoint, Message, connect};
//!
//! # async fn run() -> sigprobe::Result<()> {
//! let endpoint = Endpoint::parse("ws://127.0.0.1:8888/type=sfu&insid=sfu001")?;
//! let mut conn = connect(&endpoint, &Config::default()).await?;
//!
//! conn.send(Message::text("hello")).await?;
//! conn.close(CloseCode::Normal, "").await?;
//! while let Some(msg) = conn.recv().await? {
//!     println!("{msg:?}");
//! }
//! # Ok(())
//! # }
//! ```

mod state;

pub use state::ConnectionState;

#[allow(clippy::module_inception)]
mod connection;

pub use connection::{Connection, client_handshake, connect};
