use crate::{AudioEndpoint, AudioError};
use windows::Win32::Media::Audio::Endpoints::IAudioEndpointVolume;
use windows::Win32::Media::Audio::{eMultimedia, eRender, IMMDeviceEnumerator, MMDeviceEnumerator};
use windows::Win32::System::Com::{
    CoCreateInstance, CoInitializeEx, CLSCTX_ALL, COINIT_MULTITHREADED,
};

/// COM interfaces are not `Send`, so the endpoint is resolved on every read
/// instead of being cached across threads.
#[derive(Default)]
pub struct WasapiEndpoint {
    activated: bool,
}

impl WasapiEndpoint {
    pub fn new() -> Self {
        Self::default()
    }
}

impl AudioEndpoint for WasapiEndpoint {
    fn activate(&mut self) -> Result<(), AudioError> {
        read_master_scalar()?;
        self.activated = true;
        Ok(())
    }

    fn master_scalar(&self) -> Result<f32, AudioError> {
        if !self.activated {
            return Err(AudioError::NotActivated);
        }
        read_master_scalar()
    }
}

fn read_master_scalar() -> Result<f32, AudioError> {
    let unavailable = |e: windows::core::Error| AudioError::Unavailable(e.message().to_string());
    unsafe {
        // Already-initialised threads report S_FALSE or a mode change; both fine.
        let _ = CoInitializeEx(None, COINIT_MULTITHREADED);
        let enumerator: IMMDeviceEnumerator =
            CoCreateInstance(&MMDeviceEnumerator, None, CLSCTX_ALL).map_err(unavailable)?;
        let device = enumerator
            .GetDefaultAudioEndpoint(eRender, eMultimedia)
            .map_err(unavailable)?;
        let volume: IAudioEndpointVolume = device.Activate(CLSCTX_ALL, None).map_err(unavailable)?;
        volume.GetMasterVolumeLevelScalar().map_err(unavailable)
    }
}
