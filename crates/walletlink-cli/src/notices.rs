use std::collections::VecDeque;
use std::fmt;
use walletlink::LinkEvent;

pub const NO_WALLET_FOUND: &str = "No wallet found";
pub const AUTHORIZATION_FAILED: &str = "Authorization failed";
pub const INSTALL_ACTION: &str = "Install a wallet";

/// A message for the user, optionally with something they can do about it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub seq: u64,
    pub text: String,
    pub action: Option<NoticeAction>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NoticeAction {
    pub label: String,
    pub uri: String,
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.text)?;
        if let Some(action) = &self.action {
            write!(f, " ({}: {})", action.label, action.uri)?;
        }
        Ok(())
    }
}

/// Messages waiting to be shown, in order. A message stays queued until the
/// presenter confirms it with [`Notices::pop_shown`].
#[derive(Debug, Default)]
pub struct Notices {
    next_seq: u64,
    queue: VecDeque<Notice>,
}

impl Notices {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn show(&mut self, text: impl Into<String>, action: Option<NoticeAction>) -> u64 {
        self.next_seq += 1;
        let seq = self.next_seq;
        self.queue.push_back(Notice {
            seq,
            text: text.into(),
            action,
        });
        seq
    }

    /// Drop the message with `seq` once it has been presented.
    pub fn pop_shown(&mut self, seq: u64) -> bool {
        match self.queue.iter().position(|n| n.seq == seq) {
            Some(idx) => self.queue.remove(idx).is_some(),
            None => false,
        }
    }

    pub fn pending(&self) -> impl Iterator<Item = &Notice> {
        self.queue.iter()
    }

    /// Turn orchestration events that the user can act on into notices.
    /// A launch that was never acknowledged stays silent.
    pub fn observe(&mut self, event: &LinkEvent, install_url: &str) {
        match event {
            LinkEvent::PeerNotFound { .. } => {
                self.show(
                    NO_WALLET_FOUND,
                    Some(NoticeAction {
                        label: INSTALL_ACTION.to_string(),
                        uri: install_url.to_string(),
                    }),
                );
            }
            LinkEvent::LaunchFailed { message } => {
                self.show(format!("Could not open wallet: {message}"), None);
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use walletlink::StartErrorKind;

    #[test]
    fn sequence_numbers_increase_and_pop_removes() {
        let mut notices = Notices::new();
        let a = notices.show("first", None);
        let b = notices.show("second", None);
        assert!(b > a);

        assert!(notices.pop_shown(a));
        assert!(!notices.pop_shown(a));
        let left: Vec<_> = notices.pending().map(|n| n.text.as_str()).collect();
        assert_eq!(left, vec!["second"]);
    }

    #[test]
    fn peer_not_found_offers_install_link() {
        let mut notices = Notices::new();
        notices.observe(
            &LinkEvent::PeerNotFound {
                uri: "solana-wallet:/v1/associate/local".to_string(),
            },
            "https://wallets.example.com",
        );
        let notice = notices.pending().next().unwrap();
        assert_eq!(notice.text, NO_WALLET_FOUND);
        assert_eq!(
            notice.action.as_ref().map(|a| a.uri.as_str()),
            Some("https://wallets.example.com")
        );
        assert_eq!(
            notice.to_string(),
            "No wallet found (Install a wallet: https://wallets.example.com)"
        );
    }

    #[test]
    fn timeouts_and_progress_are_silent() {
        let mut notices = Notices::new();
        for event in [
            LinkEvent::GateAcquired,
            LinkEvent::ReadyTimedOut,
            LinkEvent::StartFailed(StartErrorKind::TimedOut),
            LinkEvent::ExchangeCancelled,
            LinkEvent::GateReleased,
        ] {
            notices.observe(&event, "https://wallets.example.com");
        }
        assert_eq!(notices.pending().count(), 0);
    }
}
