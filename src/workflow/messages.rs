// Status-line texts shown to the applicant

pub const SUBMITTING: &str = "正在提交申办...";
pub const SUBMITTED: &str = "申办流程已启动";
pub const SUBMIT_FAILED: &str = "申办失败，请稍后重试";
pub const CONFIRMING: &str = "正在确认验证码...";
pub const CONFIRMED: &str = "申办成功完成";
pub const CONFIRM_FAILED: &str = "验证码确认失败，请稍后重试";
pub const ABANDONED: &str = "申办已取消";

/// Progress assumed when the apply response does not report one
pub const INITIAL_PROGRESS: u8 = 10;
