//! Connection registration handlers: PASS, NICK, USER, PING, PONG, QUIT.

mod nick;
mod pass;
mod ping;
mod quit;
mod user;
pub mod welcome;

pub use nick::NickHandler;
pub use pass::PassHandler;
pub use ping::{PingHandler, PongHandler};
pub use quit::QuitHandler;
pub use user::UserHandler;
