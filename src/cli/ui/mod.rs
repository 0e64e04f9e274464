mod painter;
mod profile_view;
mod record_view;
mod table;

pub(crate) use self::painter::Painter;
pub(crate) use self::profile_view::ProfileView;
pub(crate) use self::record_view::RecordView;
