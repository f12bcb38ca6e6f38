mod painter;
mod status_view;
mod table;
mod upload_view;

pub(crate) use self::painter::Painter;
pub(crate) use self::status_view::StatusView;
pub(crate) use self::upload_view::UploadReceiptView;
