//! The standard handler: copy the image to a fixed offset of a device file.

use super::{BbuData, BbuError, BbuHandler, BbuUpdater, FileType};
use alloc::format;
use log::{error, info};
use spin::Mutex;

/// Device files a [StdFileUpdater] can write to.
pub trait BlockStorage: Send {
    fn write_at(&mut self, devicefile: &str, offset: usize, data: &[u8]) -> Result<(), BbuError>;
}

/// Checks every standard update goes through: the image is not empty, has
/// the handler's type (unless forced) and the update is confirmed.
pub fn std_check(handler: &BbuHandler, data: &BbuData<'_>) -> Result<(), BbuError> {
    if data.image.is_empty() {
        error!("{}: image is empty", handler.name);
        return Err(BbuError::InvalidImage);
    }
    if handler.filetype != FileType::Unknown
        && data.filetype != handler.filetype
        && !data.force(&format!(
            "Image is not of type {} but of type {}",
            handler.filetype.name(),
            data.filetype.name()
        ))
    {
        return Err(BbuError::InvalidImage);
    }
    data.confirm()
}

pub struct StdFileUpdater<S: BlockStorage> {
    storage: Mutex<S>,
    offset: usize,
}

impl<S: BlockStorage> StdFileUpdater<S> {
    pub fn new(storage: S, offset: usize) -> StdFileUpdater<S> {
        StdFileUpdater {
            storage: Mutex::new(storage),
            offset,
        }
    }

    pub fn into_storage(self) -> S {
        self.storage.into_inner()
    }
}

impl<S: BlockStorage> BbuUpdater for StdFileUpdater<S> {
    fn update(&self, handler: &BbuHandler, data: &BbuData<'_>) -> Result<(), BbuError> {
        std_check(handler, data)?;
        let devicefile = data.devicefile.unwrap_or(&*handler.devicefile);
        info!("updating to {}", devicefile);
        self.storage.lock().write_at(devicefile, self.offset, data.image)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bbu::{BbuDataFlags, BbuHandlerFlags, BbuRegistry};
    use alloc::{string::String, sync::Arc, vec, vec::Vec};

    type Writes = Arc<spin::Mutex<Vec<(String, usize, Vec<u8>)>>>;

    struct MemStorage {
        writes: Writes,
        fail: bool,
    }

    impl BlockStorage for MemStorage {
        fn write_at(&mut self, devicefile: &str, offset: usize, data: &[u8]) -> Result<(), BbuError> {
            if self.fail {
                return Err(BbuError::Io { info: "write error" });
            }
            self.writes
                .lock()
                .push((String::from(devicefile), offset, data.to_vec()));
            Ok(())
        }
    }

    fn registry(writes: &Writes, fail: bool) -> BbuRegistry {
        let mut reg = BbuRegistry::new();
        reg.register(BbuHandler::new(
            "spi",
            "/dev/m25p0.barebox",
            FileType::ArmBarebox,
            BbuHandlerFlags::DEFAULT,
            StdFileUpdater::new(
                MemStorage {
                    writes: writes.clone(),
                    fail,
                },
                0x400,
            ),
        ))
        .unwrap();
        reg
    }

    #[test]
    fn writes_confirmed_image_at_offset() {
        let writes = Writes::default();
        let reg = registry(&writes, false);
        let data = BbuData::new(&[0xaa, 0x55], FileType::ArmBarebox).with_flags(BbuDataFlags::YES);
        assert_eq!(reg.update(None, data), Ok(()));
        assert_eq!(
            *writes.lock(),
            vec![(String::from("/dev/m25p0.barebox"), 0x400, vec![0xaa, 0x55])]
        );
    }

    #[test]
    fn rejects_wrong_type_empty_and_unconfirmed() {
        let writes = Writes::default();
        let reg = registry(&writes, false);
        let wrong = BbuData::new(&[1], FileType::Fit).with_flags(BbuDataFlags::YES);
        assert_eq!(reg.update(None, wrong), Err(BbuError::InvalidImage));
        let forced = wrong.with_flags(BbuDataFlags::YES | BbuDataFlags::FORCE);
        assert_eq!(reg.update(None, forced), Ok(()));
        let empty = BbuData::new(&[], FileType::ArmBarebox).with_flags(BbuDataFlags::YES);
        assert_eq!(reg.update(None, empty), Err(BbuError::InvalidImage));
        let unconfirmed = BbuData::new(&[1], FileType::ArmBarebox);
        assert_eq!(reg.update(None, unconfirmed), Err(BbuError::NotConfirmed));
        assert_eq!(writes.lock().len(), 1);
    }

    #[test]
    fn storage_errors_are_returned() {
        let writes = Writes::default();
        let reg = registry(&writes, true);
        let data = BbuData::new(&[1], FileType::ArmBarebox).with_flags(BbuDataFlags::YES);
        assert_eq!(
            reg.update(Some("spi"), data),
            Err(BbuError::Io { info: "write error" })
        );
    }

    #[test]
    fn std_file_handler_registration() {
        let writes = Writes::default();
        let mut reg = BbuRegistry::new();
        reg.register_std_file_handler(
            "emmc",
            "/dev/mmc1.boot0",
            FileType::Unknown,
            BbuHandlerFlags::CAN_REFRESH,
            MemStorage {
                writes: writes.clone(),
                fail: false,
            },
        )
        .unwrap();
        let data = BbuData::new(&[7], FileType::Fit).with_flags(BbuDataFlags::YES);
        assert_eq!(reg.update(Some("emmc"), data), Ok(()));
        assert_eq!(writes.lock()[0].1, 0);
    }
}
