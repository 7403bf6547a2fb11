use serde::Serialize;

#[derive(Debug, Clone, Copy)]
pub struct Port {
    pub key: &'static str,
    pub metric: &'static str,
}

pub const INPUT_PORTS: [Port; 7] = [
    Port {
        key: "gpio_out_ch1",
        metric: "hil_gpio_out_ch1",
    },
    Port {
        key: "gpio_out_ch2",
        metric: "hil_gpio_out_ch2",
    },
    Port {
        key: "gpio_out_ch3",
        metric: "hil_gpio_out_ch3",
    },
    Port {
        key: "pwm_ch1",
        metric: "hil_pwm_duty_ch1_percent",
    },
    Port {
        key: "pwm_ch2",
        metric: "hil_pwm_duty_ch2_percent",
    },
    Port {
        key: "pwm_ch3",
        metric: "hil_pwm_duty_ch3_percent",
    },
    Port {
        key: "pwm_ch4",
        metric: "hil_pwm_duty_ch4_percent",
    },
];

/// Host output order.
pub const OUTPUT_PORTS: [Port; 11] = [
    Port {
        key: "gpio_in_ch1",
        metric: "hil_gpio_in_ch1",
    },
    Port {
        key: "gpio_in_ch2",
        metric: "hil_gpio_in_ch2",
    },
    Port {
        key: "gpio_in_ch3",
        metric: "hil_gpio_in_ch3",
    },
    Port {
        key: "ad_ch1",
        metric: "hil_analog_ch1_volts",
    },
    Port {
        key: "ad_ch2",
        metric: "hil_analog_ch2_volts",
    },
    Port {
        key: "ad_ch3",
        metric: "hil_analog_ch3_volts",
    },
    Port {
        key: "ad_ch4",
        metric: "hil_analog_ch4_volts",
    },
    Port {
        key: "enc1",
        metric: "hil_encoder1_count",
    },
    Port {
        key: "enc2",
        metric: "hil_encoder2_count",
    },
    Port {
        key: "enc3",
        metric: "hil_encoder3_count",
    },
    Port {
        key: "real_time",
        metric: "hil_elapsed_seconds",
    },
];

/// Actuator commands for one step, one value per input port.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct ActuatorInputs {
    pub digital: [f64; 3],
    /// Percent.
    pub duty: [f64; 4],
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct SensorOutputs {
    pub digital: [f64; 3],
    pub analog: [f64; 4],
    pub encoders: [f64; 3],
    pub elapsed_s: f64,
}

impl SensorOutputs {
    pub fn to_port_vector(&self) -> [f64; 11] {
        let mut out = [0.0; 11];
        out[0..3].copy_from_slice(&self.digital);
        out[3..7].copy_from_slice(&self.analog);
        out[7..10].copy_from_slice(&self.encoders);
        out[10] = self.elapsed_s;
        out
    }
}

/// Block characteristics reported to the host when it registers the block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BlockSizes {
    pub params: usize,
    pub tunable_params: usize,
    pub inputs: usize,
    pub input_width: usize,
    pub direct_feedthrough: bool,
    pub outputs: usize,
    pub output_width: usize,
    pub continuous_states: usize,
    pub discrete_states: usize,
    pub sample_times: usize,
}
