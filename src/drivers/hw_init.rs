//! One-shot hardware peripheral initialization.
//!
//! Configures the probe ADC channel, GPIO directions, and LEDC
//! timers/channels using raw ESP-IDF sys calls. Called once from `main()`
//! before any worker starts.

#[cfg(target_os = "espidf")]
use esp_idf_svc::sys::*;

// ── Error type ────────────────────────────────────────────────

/// Errors during one-shot peripheral initialization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HwInitError {
    AdcInitFailed(i32),
    GpioConfigFailed(i32),
    LedcInitFailed(i32),
}

impl core::fmt::Display for HwInitError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::AdcInitFailed(rc) => write!(f, "ADC1 init failed (rc={})", rc),
            Self::GpioConfigFailed(rc) => write!(f, "GPIO config failed (rc={})", rc),
            Self::LedcInitFailed(rc) => write!(f, "LEDC config failed (rc={})", rc),
        }
    }
}

impl core::error::Error for HwInitError {}

#[cfg(target_os = "espidf")]
use log::info;

#[cfg(target_os = "espidf")]
use crate::pins;

pub const LEDC_CH_BUZZER: u32 = 0;
pub const LEDC_CH_LED_R: u32 = 1;
pub const LEDC_CH_LED_G: u32 = 2;
pub const LEDC_CH_LED_B: u32 = 3;

pub const ADC1_CH_TEMP: u32 = 6;

#[cfg(target_os = "espidf")]
pub fn init_peripherals() -> Result<(), HwInitError> {
    // SAFETY: called once from main() before workers start; single-threaded.
    unsafe {
        init_adc()?;
        init_gpio_inputs()?;
        init_gpio_outputs()?;
        init_ledc()?;
    }
    info!("hw_init: all peripherals configured");
    Ok(())
}

#[cfg(not(target_os = "espidf"))]
pub fn init_peripherals() -> Result<(), HwInitError> {
    log::info!("hw_init(sim): peripheral init skipped");
    Ok(())
}

// ── ADC (oneshot) ─────────────────────────────────────────────

#[cfg(target_os = "espidf")]
static mut ADC1_HANDLE: adc_oneshot_unit_handle_t = core::ptr::null_mut();

/// SAFETY: written once by `init_adc()` before any reader exists; only the
/// sensor worker reads it afterwards.
#[cfg(target_os = "espidf")]
unsafe fn adc1_handle() -> adc_oneshot_unit_handle_t {
    unsafe { ADC1_HANDLE }
}

#[cfg(target_os = "espidf")]
unsafe fn init_adc() -> Result<(), HwInitError> {
    let init_cfg = adc_oneshot_unit_init_cfg_t {
        unit_id: adc_unit_t_ADC_UNIT_1,
        ulp_mode: adc_ulp_mode_t_ADC_ULP_MODE_DISABLE,
        ..Default::default()
    };
    // SAFETY: ADC1_HANDLE is only written here, once at boot.
    let ret = unsafe { adc_oneshot_new_unit(&init_cfg, &raw mut ADC1_HANDLE) };
    if ret != ESP_OK as i32 {
        return Err(HwInitError::AdcInitFailed(ret));
    }

    let chan_cfg = adc_oneshot_chan_cfg_t {
        atten: adc_atten_t_ADC_ATTEN_DB_12,
        bitwidth: adc_bitwidth_t_ADC_BITWIDTH_12,
    };
    let ret = unsafe { adc_oneshot_config_channel(adc1_handle(), ADC1_CH_TEMP, &chan_cfg) };
    if ret != ESP_OK as i32 {
        return Err(HwInitError::AdcInitFailed(ret));
    }

    info!("hw_init: ADC1 configured (CH{}=temp)", ADC1_CH_TEMP);
    Ok(())
}

/// Raw 12-bit reading, `None` if the driver call failed.
#[cfg(target_os = "espidf")]
pub fn adc1_read(channel: u32) -> Option<u16> {
    let mut raw: i32 = 0;
    // SAFETY: see adc1_handle(); the sensor worker is the only caller.
    let ret = unsafe { adc_oneshot_read(adc1_handle(), channel, &mut raw) };
    (ret == ESP_OK as i32).then_some(raw.max(0) as u16)
}

// ── GPIO ──────────────────────────────────────────────────────

#[cfg(target_os = "espidf")]
unsafe fn init_gpio_inputs() -> Result<(), HwInitError> {
    // Polled by the input worker, so no edge interrupt.
    let btn_cfg = gpio_config_t {
        pin_bit_mask: 1u64 << pins::BUTTON_GPIO,
        mode: gpio_mode_t_GPIO_MODE_INPUT,
        pull_up_en: gpio_pullup_t_GPIO_PULLUP_ENABLE,
        pull_down_en: gpio_pulldown_t_GPIO_PULLDOWN_DISABLE,
        intr_type: gpio_int_type_t_GPIO_INTR_DISABLE,
    };
    let ret = unsafe { gpio_config(&btn_cfg) };
    if ret != ESP_OK as i32 {
        return Err(HwInitError::GpioConfigFailed(ret));
    }
    info!("hw_init: button input configured");
    Ok(())
}

#[cfg(target_os = "espidf")]
unsafe fn init_gpio_outputs() -> Result<(), HwInitError> {
    let cfg = gpio_config_t {
        pin_bit_mask: 1u64 << pins::RELAY_GPIO,
        mode: gpio_mode_t_GPIO_MODE_OUTPUT,
        pull_up_en: gpio_pullup_t_GPIO_PULLUP_DISABLE,
        pull_down_en: gpio_pulldown_t_GPIO_PULLDOWN_ENABLE,
        intr_type: gpio_int_type_t_GPIO_INTR_DISABLE,
    };
    let ret = unsafe { gpio_config(&cfg) };
    if ret != ESP_OK as i32 {
        return Err(HwInitError::GpioConfigFailed(ret));
    }
    unsafe { gpio_set_level(pins::RELAY_GPIO, 0) };
    info!("hw_init: relay output configured (low)");
    Ok(())
}

#[cfg(target_os = "espidf")]
pub fn gpio_read(pin: i32) -> bool {
    // SAFETY: read-only register access on a configured input pin.
    (unsafe { gpio_get_level(pin) }) != 0
}

#[cfg(not(target_os = "espidf"))]
pub fn gpio_read(_pin: i32) -> bool {
    true
}

/// Returns the driver status code on failure.
#[cfg(target_os = "espidf")]
pub fn gpio_write(pin: i32, high: bool) -> Result<(), i32> {
    // SAFETY: register write on a pin configured by init_gpio_outputs().
    let ret = unsafe { gpio_set_level(pin, u32::from(high)) };
    if ret == ESP_OK as i32 { Ok(()) } else { Err(ret) }
}

#[cfg(not(target_os = "espidf"))]
pub fn gpio_write(_pin: i32, _high: bool) -> Result<(), i32> {
    Ok(())
}

// ── LEDC PWM ─────────────────────────────────────────────────

#[cfg(target_os = "espidf")]
unsafe fn init_ledc() -> Result<(), HwInitError> {
    let check = |ret: i32| {
        if ret == ESP_OK as i32 {
            Ok(())
        } else {
            Err(HwInitError::LedcInitFailed(ret))
        }
    };

    // Timer 0: buzzer (retuned per tone, 8-bit)
    check(unsafe {
        ledc_timer_config(&ledc_timer_config_t {
            speed_mode: ledc_mode_t_LEDC_LOW_SPEED_MODE,
            timer_num: ledc_timer_t_LEDC_TIMER_0,
            duty_resolution: ledc_timer_bit_t_LEDC_TIMER_8_BIT,
            freq_hz: pins::BUZZER_BASE_FREQ_HZ,
            clk_cfg: soc_periph_ledc_clk_src_legacy_t_LEDC_AUTO_CLK,
            ..Default::default()
        })
    })?;

    // Timer 1: status LED (1 kHz, 8-bit)
    check(unsafe {
        ledc_timer_config(&ledc_timer_config_t {
            speed_mode: ledc_mode_t_LEDC_LOW_SPEED_MODE,
            timer_num: ledc_timer_t_LEDC_TIMER_1,
            duty_resolution: ledc_timer_bit_t_LEDC_TIMER_8_BIT,
            freq_hz: pins::LED_PWM_FREQ_HZ,
            clk_cfg: soc_periph_ledc_clk_src_legacy_t_LEDC_AUTO_CLK,
            ..Default::default()
        })
    })?;

    let channels = [
        (LEDC_CH_BUZZER, ledc_timer_t_LEDC_TIMER_0, pins::BUZZER_GPIO),
        (LEDC_CH_LED_R, ledc_timer_t_LEDC_TIMER_1, pins::LED_R_GPIO),
        (LEDC_CH_LED_G, ledc_timer_t_LEDC_TIMER_1, pins::LED_G_GPIO),
        (LEDC_CH_LED_B, ledc_timer_t_LEDC_TIMER_1, pins::LED_B_GPIO),
    ];
    for (channel, timer, gpio) in channels {
        check(unsafe {
            ledc_channel_config(&ledc_channel_config_t {
                speed_mode: ledc_mode_t_LEDC_LOW_SPEED_MODE,
                channel,
                timer_sel: timer,
                gpio_num: gpio,
                duty: 0,
                hpoint: 0,
                ..Default::default()
            })
        })?;
    }

    info!("hw_init: LEDC configured (buzzer=CH0, led=CH1-3)");
    Ok(())
}

#[cfg(target_os = "espidf")]
pub fn ledc_set(channel: u32, duty: u8) {
    // SAFETY: channel configured in init_ledc(); each channel has exactly
    // one owning driver.
    unsafe {
        ledc_set_duty(ledc_mode_t_LEDC_LOW_SPEED_MODE, channel, u32::from(duty));
        ledc_update_duty(ledc_mode_t_LEDC_LOW_SPEED_MODE, channel);
    }
}

#[cfg(not(target_os = "espidf"))]
pub fn ledc_set(_channel: u32, _duty: u8) {}

/// Retune the buzzer timer.
#[cfg(target_os = "espidf")]
pub fn buzzer_freq(freq_hz: u32) {
    // SAFETY: timer 0 is owned by the buzzer driver.
    unsafe {
        ledc_set_freq(
            ledc_mode_t_LEDC_LOW_SPEED_MODE,
            ledc_timer_t_LEDC_TIMER_0,
            freq_hz,
        );
    }
}

#[cfg(not(target_os = "espidf"))]
pub fn buzzer_freq(_freq_hz: u32) {}
