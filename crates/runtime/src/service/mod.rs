//! Services: data shaping, assembly, lifecycle, turns, and views.
pub mod assembler;
pub mod data;
pub mod lifecycle;
pub mod turn;
pub mod view;

pub use assembler::{
    AssembleRequest, AssembleScope, CharacterSource, ContextAssembler, EquipmentPiece,
    SetupTemplate, StaticCharacter, StaticCharacterSource, Vitals,
};
pub use data::{BattleContext, DataService, MovesDoc};
pub use lifecycle::{
    AccountManager, CreateBattleConfig, InMemoryAccounts, LifecycleService, MemberSpec,
    SessionResults, TeamSpec,
};
pub use turn::{MoveRequest, TurnService};
pub use view::{BattleStatus, DashboardView, FighterCard, ShortCard, ViewService};
