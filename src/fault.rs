//! Fault accumulation for partial-failure paths.
//!
//! Mutation operations that can partially fail — dropping a set of
//! sstables, notifying a list of subscribers — complete as much of the
//! declared work as possible and collect what went wrong along the way.
//! The accumulated chain is surfaced to the caller exactly once, at the
//! end, via [`FaultChain::into_result`].

use std::error::Error;
use std::fmt;

/// One recorded fault: what was being attempted, and what failed.
#[derive(Debug)]
pub struct Fault {
    context: String,
    source: Box<dyn Error + Send + Sync>,
}

impl Fault {
    pub fn context(&self) -> &str {
        &self.context
    }

    pub fn source(&self) -> &(dyn Error + Send + Sync) {
        self.source.as_ref()
    }
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.context, self.source)
    }
}

/// Faults collected over one multi-step operation.
#[derive(Debug, Default)]
pub struct FaultChain {
    faults: Vec<Fault>,
}

impl FaultChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a fault and keeps going.
    pub fn push(
        &mut self,
        context: impl Into<String>,
        source: impl Into<Box<dyn Error + Send + Sync>>,
    ) {
        self.faults.push(Fault {
            context: context.into(),
            source: source.into(),
        });
    }

    /// Runs `step`, recording its error (if any) under `context`.
    pub fn run<E>(&mut self, context: &str, step: impl FnOnce() -> Result<(), E>)
    where
        E: Into<Box<dyn Error + Send + Sync>>,
    {
        if let Err(e) = step() {
            self.push(context, e);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.faults.is_empty()
    }

    pub fn len(&self) -> usize {
        self.faults.len()
    }

    /// The single raise point: `Ok(())` when nothing failed, otherwise
    /// every fault folded into one error value.
    pub fn into_result(self) -> Result<(), AccumulatedFaults> {
        if self.faults.is_empty() {
            Ok(())
        } else {
            Err(AccumulatedFaults {
                faults: self.faults,
            })
        }
    }
}

/// Terminal error carrying every fault of a partially-failed operation.
#[derive(Debug)]
pub struct AccumulatedFaults {
    faults: Vec<Fault>,
}

impl AccumulatedFaults {
    pub fn faults(&self) -> &[Fault] {
        &self.faults
    }
}

impl fmt::Display for AccumulatedFaults {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} fault(s):", self.faults.len())?;
        for fault in &self.faults {
            write!(f, " [{fault}]")?;
        }
        Ok(())
    }
}

impl Error for AccumulatedFaults {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        self.faults
            .first()
            .map(|f| f.source.as_ref() as &(dyn Error + 'static))
    }
}

#[cfg(test)]
mod tests {
    use super::FaultChain;
    use std::io;

    #[test]
    fn empty_chain_is_ok() {
        assert!(FaultChain::new().into_result().is_ok());
    }

    #[test]
    fn collects_and_reports_all_faults() {
        let mut chain = FaultChain::new();
        chain.run("step one", || Ok::<(), io::Error>(()));
        chain.run("step two", || Err(io::Error::other("boom")));
        chain.push("step three", io::Error::other("bang"));

        assert_eq!(chain.len(), 2);
        let err = chain.into_result().unwrap_err();
        assert_eq!(err.faults().len(), 2);
        let rendered = err.to_string();
        assert!(rendered.contains("step two: boom"));
        assert!(rendered.contains("step three: bang"));
    }
}
