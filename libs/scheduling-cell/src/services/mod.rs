pub mod availability;
pub mod availability_editor;
pub mod block_editor;
pub mod booking;
pub mod clock;
pub mod exceptions;
pub mod memory;
pub mod slots;
pub mod store;
pub mod supabase_store;
pub mod time_grid;

pub use availability::AvailabilityService;
pub use availability_editor::{AvailabilityEditor, DayEditState};
pub use block_editor::{BlockEditorState, DateBlockEditor, SelectionMode};
pub use booking::BookingService;
pub use clock::{Clock, FixedClock, SystemClock};
pub use exceptions::DateBlockService;
pub use memory::MemoryScheduleStore;
pub use slots::{generate_slots, SlotService};
pub use store::{AvailabilityRuleStore, BookingStore, DateExceptionStore};
pub use supabase_store::SupabaseScheduleStore;
