// Draft ranking domain: player identity, ranked lists, retention, reordering,
// window gating and snake allocation.

pub mod player;
pub mod ranked_list;
pub mod reorder;
pub mod retention;
pub mod snake;
pub mod window;
