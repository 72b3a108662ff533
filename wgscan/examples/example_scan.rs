use std::sync::Arc;

use futures::executor::block_on;
use wgscan::{
    exclusive_scan_with, inclusive_scan_with, Control, DeviceScan, DeviceVec, Operator,
    ScanConfig, WgContext,
};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let input_data = vec![1u32, 2, 3, 4, 5, 6, 7, 8, 9, 10];
    println!("Input data:      {:?}", input_data);

    let host = Control::host();
    let mut result = vec![0u32; input_data.len()];
    inclusive_scan_with(&host, &input_data, &mut result, &Operator::Add)?;
    println!("Inclusive (add): {:?}", result);
    // [1, 3, 6, 10, 15, 21, 28, 36, 45, 55]

    exclusive_scan_with(&host, &input_data, &mut result, 0, &Operator::Add)?;
    println!("Exclusive (add): {:?}", result);
    // [0, 1, 3, 6, 10, 15, 21, 28, 36, 45]

    let digits = [3i32, 1, 4, 1, 5, 9, 2, 6];
    let mut running_max = [0i32; 8];
    inclusive_scan_with(&host, &digits, &mut running_max, &Operator::Max)?;
    println!("Running max:     {:?}", running_max);
    // [3, 3, 4, 4, 5, 9, 9, 9]

    let context = match block_on(WgContext::new()) {
        Ok(context) => Arc::new(context),
        Err(err) => {
            println!("No device available ({}), skipping the device part", err);
            return Ok(());
        }
    };
    println!("Device:          {}", context.adapter_info().name);

    let big: Vec<u32> = (0..1_000_000).map(|x| x % 7).collect();
    let mut device_result = vec![0u32; big.len()];
    let device = Control::device(context.clone());
    inclusive_scan_with(&device, &big, &mut device_result, &Operator::Add)?;
    println!("Device total:    {}", device_result[big.len() - 1]);

    let scan = DeviceScan::new(&context, &Operator::Add, &ScanConfig::default())?;
    let vector = DeviceVec::from_slice(&context, &input_data);
    scan.inclusive(&vector)?;
    println!("DeviceVec scan:  {:?}", vector.to_vec(&context)?);

    Ok(())
}
