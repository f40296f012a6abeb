//! The authoritative record of which descriptors the poller watches:
//! listeners (fixed at startup) and session descriptors (appended as
//! connections arrive). Spec §2/§3 describes this as array-prefix
//! bookkeeping over a flat `pollfd` table; here it collapses into direct
//! `Token` lookups, the simplification spec §9's "Socket↔Connection
//! association" design note recommends over the original's linear search.

use mio::Token;

/// Hands out `Token`s in increasing order. Listener tokens are allocated
/// first and never reused; session tokens are allocated on accept.
#[derive(Debug, Default)]
pub struct TokenAllocator {
    next: usize,
}

impl TokenAllocator {
    pub fn new() -> Self {
        TokenAllocator { next: 0 }
    }

    pub fn next_token(&mut self) -> Token {
        let token = Token(self.next);
        self.next += 1;
        token
    }
}

/// Tracks which tokens belong to listeners, so the scheduler can tell a
/// "new connection" readiness event apart from a "session" one without
/// keeping listeners and sessions in the same table.
#[derive(Debug, Default)]
pub struct ListenerSet {
    tokens: Vec<Token>,
}

impl ListenerSet {
    pub fn new() -> Self {
        ListenerSet { tokens: Vec::new() }
    }

    pub fn insert(&mut self, token: Token) {
        self.tokens.push(token);
    }

    pub fn contains(&self, token: Token) -> bool {
        self.tokens.contains(&token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokens_increase_monotonically() {
        let mut alloc = TokenAllocator::new();
        let a = alloc.next_token();
        let b = alloc.next_token();
        let c = alloc.next_token();
        assert_eq!(a, Token(0));
        assert_eq!(b, Token(1));
        assert_eq!(c, Token(2));
    }

    #[test]
    fn listener_set_distinguishes_tokens() {
        let mut listeners = ListenerSet::new();
        listeners.insert(Token(0));
        listeners.insert(Token(1));
        assert!(listeners.contains(Token(0)));
        assert!(listeners.contains(Token(1)));
        assert!(!listeners.contains(Token(2)));
    }
}
