pub const SUBSCRIBE: &str = "/subscribe";
pub const ACTIVATE: &str = "/activate";
pub const UNSUBSCRIBE: &str = "/unsubscribe";
