//! Scripted AT client for driver tests.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;
use std::string::String;
use std::sync::Once;
use std::vec::Vec;

use atat::asynch::AtatClient;
use atat::AtatCmd;
use embassy_futures::yield_now;

use crate::config::CellularConfig;

static INIT: Once = Once::new();

pub fn init_logger() {
    INIT.call_once(|| {
        let _ = env_logger::builder().is_test(true).try_init();
    });
}

/// Result the mock answers the next command with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// Final `OK` with an optional information response, e.g.
    /// `+CGPADDR: 1,"10.0.0.2"`
    Ok(Vec<u8>),
    Error,
    Timeout,
}

impl Reply {
    pub fn ok(response: &str) -> Self {
        Self::Ok(response.as_bytes().to_vec())
    }
}

#[derive(Debug, Default)]
pub struct MockLog {
    /// Written bytes and whether a result code was awaited
    sent: Vec<(String, bool)>,
    replies: VecDeque<Reply>,
}

impl MockLog {
    pub fn commands(&self) -> Vec<String> {
        self.sent.iter().map(|(c, _)| c.clone()).collect()
    }

    pub fn awaited(&self) -> Vec<bool> {
        self.sent.iter().map(|(_, a)| *a).collect()
    }

    /// Commands containing `needle`.
    pub fn matching(&self, needle: &str) -> Vec<String> {
        self.sent
            .iter()
            .filter(|(c, _)| c.contains(needle))
            .map(|(c, _)| c.clone())
            .collect()
    }

    pub fn reply(&mut self, reply: Reply) {
        self.replies.push_back(reply);
    }
}

pub type Log = Rc<RefCell<MockLog>>;

pub struct MockAtClient {
    log: Log,
}

impl MockAtClient {
    pub fn new() -> Self {
        init_logger();
        Self {
            log: Rc::new(RefCell::new(MockLog::default())),
        }
    }

    pub fn log(&self) -> Log {
        self.log.clone()
    }
}

impl AtatClient for MockAtClient {
    async fn send<Cmd: AtatCmd>(&mut self, cmd: &Cmd) -> Result<Cmd::Response, atat::Error> {
        let mut buf = std::vec![0u8; Cmd::MAX_LEN];
        let len = cmd.write(&mut buf);
        let text = String::from_utf8_lossy(&buf[..len]).into_owned();

        let reply = {
            let mut log = self.log.borrow_mut();
            log.sent.push((text, Cmd::EXPECTS_RESPONSE_CODE));
            match Cmd::EXPECTS_RESPONSE_CODE {
                true => log.replies.pop_front(),
                false => None,
            }
        };
        // Give the modem side of the test a chance to react.
        yield_now().await;

        match reply.unwrap_or(Reply::Ok(Vec::new())) {
            Reply::Ok(bytes) => cmd.parse(Ok(&bytes)),
            Reply::Error => cmd.parse(Err(atat::InternalError::Error)),
            Reply::Timeout => Err(atat::Error::Timeout),
        }
    }
}

/// Wait until a command containing `needle` has been written, up to `nth`
/// occurrences.
pub async fn until_sent(log: &Log, needle: &str, nth: usize) {
    for _ in 0..100_000 {
        if log.borrow().matching(needle).len() >= nth {
            return;
        }
        yield_now().await;
    }
    panic!("{:?} never sent, log: {:?}", needle, log.borrow().commands());
}

/// Wait until `cond` holds, yielding to the driver side in between.
pub async fn until(cond: impl Fn() -> bool) {
    for _ in 0..100_000 {
        if cond() {
            return;
        }
        yield_now().await;
    }
    panic!("condition never met");
}

pub struct TestConfig;

impl CellularConfig for TestConfig {}
