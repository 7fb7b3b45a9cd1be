//! End-to-end self-test of a hub
//!
//! [`HubTester`] registers two calculator peers and a send-only driver,
//! drives the full register, request and unregister cycle through any
//! [`HubService`] handle, and reports the first discrepancy as
//! [`PlasticError::TestFailed`].

use crate::error::{PlasticError, Result};
use crate::identifier::Identifier;
use crate::listener::{HubService, PlasticListener, ResponseMap};
use crate::value::Value;
use async_trait::async_trait;
use once_cell::sync::Lazy;
use std::sync::{Arc, Mutex};
use tracing::info;

/// Message understood by [`Calculator`]: `[operation, operand]`
pub static CALC: Lazy<Identifier> =
    Lazy::new(|| Identifier::from_static("ivo://plastic.starlink.ac.uk/test/calc"));

pub const PLUS: &str = "PLUS";
pub const MINUS: &str = "MINUS";
pub const TIMES: &str = "TIMES";

/// A peer holding a running integer total.
///
/// Answers [`CALC`] with the new total and ignores everything else.
#[derive(Debug, Default)]
pub struct Calculator {
    total: Mutex<i32>,
}

impl Calculator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn total(&self) -> i32 {
        *self.total.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn apply(&self, op: &str, operand: i32) -> Result<i32> {
        let mut total = self.total.lock().unwrap_or_else(|e| e.into_inner());
        *total = match op {
            PLUS => total.wrapping_add(operand),
            MINUS => total.wrapping_sub(operand),
            TIMES => total.wrapping_mul(operand),
            other => {
                return Err(PlasticError::bad_argument(
                    CALC.as_str(),
                    format!("unknown operation {}", other),
                ))
            }
        };
        Ok(*total)
    }
}

#[async_trait]
impl PlasticListener for Calculator {
    async fn perform(
        &self,
        _sender: &Identifier,
        message: &Identifier,
        args: &[Value],
    ) -> Result<Value> {
        if message != &*CALC {
            return Ok(Value::Null);
        }
        let op = args.first().and_then(Value::as_str);
        let operand = args.get(1).and_then(Value::as_int);
        match (op, operand) {
            (Some(op), Some(operand)) => Ok(Value::Int(self.apply(op, operand)?)),
            _ => Err(PlasticError::bad_argument(
                CALC.as_str(),
                "expected [operation, integer]",
            )),
        }
    }
}

fn check(condition: bool, what: impl FnOnce() -> String) -> Result<()> {
    if condition {
        Ok(())
    } else {
        Err(PlasticError::TestFailed(what()))
    }
}

fn expect_totals(results: &ResponseMap, expected: &[(&Identifier, i32)], step: &str) -> Result<()> {
    for (id, total) in expected {
        let got = results.get(*id);
        check(got == Some(&Value::Int(*total)), || {
            format!("{}: expected {} from {}, got {:?}", step, total, id, got)
        })?;
    }
    Ok(())
}

struct Peers {
    driver: Identifier,
    c1: Identifier,
    c2: Identifier,
    calc1: Arc<Calculator>,
    calc2: Arc<Calculator>,
}

/// Runs the calculator scenario against a hub
pub struct HubTester<H: HubService + ?Sized> {
    hub: Arc<H>,
}

impl<H: HubService + ?Sized> HubTester<H> {
    pub fn new(hub: Arc<H>) -> Self {
        Self { hub }
    }

    /// Runs every check. Registrations made by the test are removed
    /// whether it passes or not.
    pub async fn run(&self) -> Result<()> {
        let hub_id = self.hub.get_hub_id().await?;
        let driver = self.hub.register_no_callback("hub-tester").await?;
        let calc1 = Arc::new(Calculator::new());
        let calc2 = Arc::new(Calculator::new());
        let registered = async {
            let c1 = self
                .hub
                .register_listener("calc1", &[CALC.clone()], calc1.clone())
                .await?;
            let c2 = self
                .hub
                .register_listener("calc2", &[CALC.clone()], calc2.clone())
                .await;
            match c2 {
                Ok(c2) => Ok((c1, c2)),
                Err(e) => {
                    let _ = self.hub.unregister(&c1).await;
                    Err(e)
                }
            }
        }
        .await;
        let (c1, c2) = match registered {
            Ok(ids) => ids,
            Err(e) => {
                let _ = self.hub.unregister(&driver).await;
                return Err(e);
            }
        };

        let peers = Peers {
            driver,
            c1,
            c2,
            calc1,
            calc2,
        };
        let outcome = self.exercise(&hub_id, &peers).await;
        for id in [&peers.c1, &peers.c2, &peers.driver] {
            let _ = self.hub.unregister(id).await;
        }
        outcome?;

        let remaining = self.hub.get_registered_ids().await?;
        for id in [&peers.c1, &peers.c2, &peers.driver] {
            check(!remaining.contains(id), || {
                format!("{} still registered after unregister", id)
            })?;
        }
        info!("Hub test passed");
        Ok(())
    }

    async fn exercise(&self, hub_id: &Identifier, p: &Peers) -> Result<()> {
        let hub = &self.hub;

        let ids = hub.get_registered_ids().await?;
        check(ids.contains(hub_id), || "hub id not registered".into())?;
        for id in [&p.driver, &p.c1, &p.c2] {
            let count = ids.iter().filter(|i| *i == id).count();
            check(count == 1, || format!("{} registered {} times", id, count))?;
        }
        let name = hub.get_name(&p.c2).await?;
        check(name.as_deref() == Some("calc2"), || {
            format!("wrong name for calc2: {:?}", name)
        })?;

        let results = hub
            .request(&p.driver, &CALC, &[Value::from(PLUS), Value::Int(10)])
            .await?;
        check(!results.contains_key(&p.driver), || "sender got its own request".into())?;
        expect_totals(&results, &[(&p.c1, 10), (&p.c2, 10)], "broadcast PLUS 10")?;

        let results = hub
            .request(&p.driver, &CALC, &[Value::from(MINUS), Value::Int(5)])
            .await?;
        expect_totals(&results, &[(&p.c1, 5), (&p.c2, 5)], "broadcast MINUS 5")?;

        let results = hub
            .request(&p.driver, &CALC, &[Value::from(TIMES), Value::Int(3)])
            .await?;
        expect_totals(&results, &[(&p.c1, 15), (&p.c2, 15)], "broadcast TIMES 3")?;

        let results = hub
            .request_to_subset(
                &p.driver,
                &CALC,
                &[Value::from(PLUS), Value::Int(90)],
                std::slice::from_ref(&p.c1),
            )
            .await?;
        check(results.len() == 1, || {
            format!("subset request answered by {} peers", results.len())
        })?;
        expect_totals(&results, &[(&p.c1, 105)], "subset PLUS 90")?;
        check(p.calc1.total() == 105 && p.calc2.total() == 15, || {
            format!(
                "totals after subset request are {} and {}",
                p.calc1.total(),
                p.calc2.total()
            )
        })?;

        hub.unregister(&p.c1).await?;
        hub.unregister(&p.c1).await?;
        let results = hub
            .request(&p.driver, &CALC, &[Value::from(PLUS), Value::Int(0)])
            .await?;
        check(!results.contains_key(&p.c1), || "unregistered peer still answers".into())?;
        expect_totals(&results, &[(&p.c2, 15)], "broadcast after unregister")?;
        let interested = hub.get_message_registered_ids(&CALC).await?;
        check(!interested.contains(&p.c1), || "unregistered peer still listed".into())?;
        check(interested.contains(&p.c2), || "calc2 not listed for calc".into())?;
        Ok(())
    }
}
