mod answers;
mod category;
mod identity;
mod ids;
mod progress;
mod question;
mod quiz_result;
mod score;
mod stage;

pub use ids::{CategoryId, ParseIdError, QuestionId, StageNumber, UserId};

pub use answers::{AnswerError, AnswerSheet};
pub use category::{Category, CategoryError, DEFAULT_INITIAL_STAGE, DEFAULT_MAX_STAGE};
pub use identity::Identity;
pub use progress::{ProgressKey, ProgressRecord, StageProgress};
pub use question::{Question, QuestionError};
pub use quiz_result::QuizResult;
pub use score::{PASS_MARK, Score, ScoreError};
pub use stage::Stage;
