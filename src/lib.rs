pub mod builtins;
pub mod definition;
pub mod error;
pub mod fresh;
pub mod machine;
pub mod matching;
pub mod metrics;
pub mod oracle;
pub mod prover;
pub mod scheduler;
pub mod subst;
pub mod symbol;
pub mod term;
pub mod trace;

#[cfg(test)]
pub(crate) mod test_utils;
