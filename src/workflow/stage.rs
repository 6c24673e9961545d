use std::fmt;

/// 流水线阶段，严格按声明顺序推进
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Stage {
    Start,
    Configuring,
    Connecting,
    Navigating,
    LocatingIframe,
    SwitchingContext,
    LocatingVideo,
    ExtractingAttribute,
    CleaningUp,
    Terminated,
}

impl Stage {
    /// 事件和日志里使用的短名
    pub fn label(self) -> &'static str {
        match self {
            Stage::Start => "start",
            Stage::Configuring => "configure",
            Stage::Connecting => "connect",
            Stage::Navigating => "navigate",
            Stage::LocatingIframe => "iframe",
            Stage::SwitchingContext => "switch-context",
            Stage::LocatingVideo => "video",
            Stage::ExtractingAttribute => "extract",
            Stage::CleaningUp => "cleanup",
            Stage::Terminated => "terminated",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}
