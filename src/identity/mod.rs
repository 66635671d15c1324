//! Identity and session state for the portal: who is signed in, as which
//! role, and whether the session is a real one or a demo persona.
//! Keep the public surface thin and split implementation across sub-modules.

mod role;
mod profile;
mod session;
mod provider;
mod profile_store;
mod effects;
pub mod machine;
mod store;

pub use role::Role;
pub use profile::{ClinicalPatch, PatientDetails, PracticePatch, Profile, ProfileBase, ProfilePatch, ProviderDetails};
pub use session::{Session, SessionManager, SessionToken};
pub use provider::{
    DirectoryConfig, HashCost, IdentityDirectory, IdentityProvider, LocalIdentityProvider, SessionEvent, SignUpMetadata,
    SignUpReceipt,
};
pub use profile_store::{MemoryProfileStore, PatientQuery, ProfileStore};
pub use effects::{Effect, EffectSink, Navigation, NoticeKind, Notification, TracingSink};
pub use machine::{AuthState, AuthStatus, EndReason, Event};
pub use store::{AuthSnapshot, Outcome, SessionStore, StoreConfig, Subscription};
