//! Numeric reply codes.
//!
//! Only the numerics this server actually emits are listed.
//!
//! # Reference
//! - RFC 2812: Internet Relay Chat: Client Protocol
//! - IRCv3 SASL: <https://ircv3.net/specs/extensions/sasl-3.1>

#![allow(non_camel_case_types)]

/// Numeric reply code.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u16)]
#[non_exhaustive]
pub enum Response {
    // === Connection Registration (001-099) ===
    /// 001 - Welcome to the network
    RPL_WELCOME = 1,
    /// 002 - Your host is running version
    RPL_YOURHOST = 2,
    /// 003 - Server creation date
    RPL_CREATED = 3,
    /// 004 - Server info
    RPL_MYINFO = 4,
    /// 005 - Supported features (ISUPPORT)
    RPL_ISUPPORT = 5,

    // === Command Responses (200-399) ===
    /// 221 - User mode string
    RPL_UMODEIS = 221,
    /// 301 - Target is away
    RPL_AWAY = 301,
    /// 305 - No longer marked away
    RPL_UNAWAY = 305,
    /// 306 - Now marked away
    RPL_NOWAWAY = 306,
    /// 311 - WHOIS user line
    RPL_WHOISUSER = 311,
    /// 312 - WHOIS server line
    RPL_WHOISSERVER = 312,
    /// 315 - End of WHO
    RPL_ENDOFWHO = 315,
    /// 317 - WHOIS idle time
    RPL_WHOISIDLE = 317,
    /// 318 - End of WHOIS
    RPL_ENDOFWHOIS = 318,
    /// 319 - WHOIS channel list
    RPL_WHOISCHANNELS = 319,
    /// 322 - LIST entry
    RPL_LIST = 322,
    /// 323 - End of LIST
    RPL_LISTEND = 323,
    /// 324 - Channel mode string
    RPL_CHANNELMODEIS = 324,
    /// 331 - No topic set
    RPL_NOTOPIC = 331,
    /// 332 - Channel topic
    RPL_TOPIC = 332,
    /// 352 - WHO entry
    RPL_WHOREPLY = 352,
    /// 353 - NAMES entry
    RPL_NAMREPLY = 353,
    /// 366 - End of NAMES
    RPL_ENDOFNAMES = 366,
    /// 372 - MOTD line
    RPL_MOTD = 372,
    /// 375 - MOTD start
    RPL_MOTDSTART = 375,
    /// 376 - End of MOTD
    RPL_ENDOFMOTD = 376,

    // === Error Replies (400-599) ===
    /// 401 - No such nick
    ERR_NOSUCHNICK = 401,
    /// 403 - No such channel
    ERR_NOSUCHCHANNEL = 403,
    /// 404 - Cannot send to channel
    ERR_CANNOTSENDTOCHAN = 404,
    /// 421 - Unknown command
    ERR_UNKNOWNCOMMAND = 421,
    /// 422 - No MOTD
    ERR_NOMOTD = 422,
    /// 431 - No nickname given
    ERR_NONICKNAMEGIVEN = 431,
    /// 432 - Erroneous nickname
    ERR_ERRONEUSNICKNAME = 432,
    /// 433 - Nickname in use
    ERR_NICKNAMEINUSE = 433,
    /// 442 - Not on channel
    ERR_NOTONCHANNEL = 442,
    /// 451 - Not registered
    ERR_NOTREGISTERED = 451,
    /// 461 - Not enough parameters
    ERR_NEEDMOREPARAMS = 461,
    /// 462 - Already registered
    ERR_ALREADYREGISTRED = 462,
    /// 464 - Password incorrect / required
    ERR_PASSWDMISMATCH = 464,
    /// 482 - Channel operator privileges needed
    ERR_CHANOPRIVSNEEDED = 482,

    // === SASL (900-909) ===
    /// 900 - Logged in
    RPL_LOGGEDIN = 900,
    /// 903 - SASL success
    RPL_SASLSUCCESS = 903,
    /// 904 - SASL failure
    ERR_SASLFAIL = 904,
}

impl Response {
    /// Numeric value.
    #[inline]
    pub fn code(self) -> u16 {
        self as u16
    }

    /// Zero-padded three-digit code as sent on the wire.
    pub fn code_str(self) -> String {
        format!("{:03}", self.code())
    }

    /// Whether this is an error numeric (400-599, 904).
    pub fn is_error(self) -> bool {
        matches!(self.code(), 400..=599) || self == Response::ERR_SASLFAIL
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_zero_padded() {
        assert_eq!(Response::RPL_WELCOME.code_str(), "001");
        assert_eq!(Response::RPL_ISUPPORT.code_str(), "005");
        assert_eq!(Response::ERR_PASSWDMISMATCH.code_str(), "464");
        assert_eq!(Response::RPL_SASLSUCCESS.code_str(), "903");
    }

    #[test]
    fn error_classification() {
        assert!(Response::ERR_NOSUCHNICK.is_error());
        assert!(Response::ERR_SASLFAIL.is_error());
        assert!(!Response::RPL_LOGGEDIN.is_error());
        assert!(!Response::RPL_TOPIC.is_error());
    }
}
