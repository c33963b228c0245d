pub mod automation;

pub use automation::{
    eval_as, AutomationSession, ResponseMatcher, ResponseMeta, SessionFactory, SessionOptions,
};
