pub struct Table;

// 时间统一存储为目标时区的无时区 DATETIME

impl Table {
    pub const ALL: [&'static str; 5] = [
        Self::CENTER_TABLE,
        Self::EMPLOYEE_TABLE,
        Self::VEHICLE_MODEL_TABLE,
        Self::ATTENDANCE_TABLE,
        Self::WORKORDER_TABLE,
    ];

    pub const CENTER_TABLE: &'static str = "CREATE TABLE IF NOT EXISTS center_details(
            center_code VARCHAR(20) NOT NULL,
            center_name VARCHAR(60) NOT NULL,
            center_location VARCHAR(100) NULL,
            center_type VARCHAR(40) NULL,
            status VARCHAR(10) NULL,
            PRIMARY KEY (center_code)
        )
    ";
    /// password 为 argon2 PHC 字符串
    ///
    /// last_working_day 仅在 Inactive 时有值
    pub const EMPLOYEE_TABLE: &'static str = "CREATE TABLE IF NOT EXISTS employee_details(
            employee_code VARCHAR(20) NOT NULL,
            employee_name VARCHAR(60) NOT NULL,
            password VARCHAR(255) NOT NULL,
            center_code VARCHAR(20) NULL,
            center_name VARCHAR(60) NULL,
            center_location VARCHAR(100) NULL,
            center_type VARCHAR(40) NULL,
            user_role VARCHAR(20) NOT NULL,
            user_details VARCHAR(30) NULL,
            employee_doj DATE NULL,
            employee_status VARCHAR(10) NOT NULL,
            last_working_day DATE NULL,
            updated_by VARCHAR(20) NULL,
            PRIMARY KEY (employee_code)
        )
    ";
    pub const VEHICLE_MODEL_TABLE: &'static str = "CREATE TABLE IF NOT EXISTS vehicle_model(
            vehicle_manufacturer VARCHAR(60) NOT NULL,
            vehicle_model VARCHAR(60) NOT NULL,
            PRIMARY KEY (vehicle_manufacturer, vehicle_model)
        )
    ";
    /// 每个员工每天一行，四次打卡按固定顺序写入
    pub const ATTENDANCE_TABLE: &'static str = "CREATE TABLE IF NOT EXISTS preamji_attendance(
            id BIGINT NOT NULL AUTO_INCREMENT,
            attendance_date DATE NOT NULL,
            emp_code_of_thetechnician VARCHAR(20) NOT NULL,
            name_of_technician VARCHAR(60) NOT NULL,
            center_name VARCHAR(60) NULL,
            center_location VARCHAR(100) NULL,
            on_duty_in_time DATETIME NULL,
            on_duty_in_image MEDIUMBLOB NULL,
            intermidiate_off_out_time DATETIME NULL,
            intermidiate_off_out_image MEDIUMBLOB NULL,
            intermidiate_off_in_time DATETIME NULL,
            intermidiate_off_in_image MEDIUMBLOB NULL,
            on_duty_out_time DATETIME NULL,
            on_duty_out_image MEDIUMBLOB NULL,
            total_working_hrs DOUBLE NULL,
            total_break_hrs DOUBLE NULL,
            effective_working_hrs DOUBLE NULL,
            all_innitial_time DATETIME NOT NULL,
            last_edit_timestamp DATETIME NOT NULL,
            marked_by VARCHAR(20) NULL,
            PRIMARY KEY (id),
            UNIQUE KEY uq_employee_day (emp_code_of_thetechnician, attendance_date)
        )
    ";
    /// job_status: In Progress / Re-assigned / Closed
    ///
    /// open_jobcard_key 只在 In Progress 且未删除时有值，唯一索引保证同一中心同一工单号最多一条进行中
    pub const WORKORDER_TABLE: &'static str = "CREATE TABLE IF NOT EXISTS workorder_entry(
            id BIGINT NOT NULL AUTO_INCREMENT,
            jobcard_type VARCHAR(30) NOT NULL,
            technician_code VARCHAR(20) NOT NULL,
            name_of_technician VARCHAR(60) NOT NULL,
            jobcard_photo MEDIUMBLOB NULL,
            previous_jobcard_no VARCHAR(50) NULL,
            vehicle_registration_no VARCHAR(30) NOT NULL,
            vehicle_manufacturer VARCHAR(60) NULL,
            vehicle_model VARCHAR(60) NULL,
            vehicle_variant VARCHAR(60) NULL,
            jobcard_no VARCHAR(50) NOT NULL,
            jobcard_date DATE NOT NULL,
            job_assign_date DATE NOT NULL,
            kilometres INT UNSIGNED NOT NULL DEFAULT 0,
            name_of_service_advisor VARCHAR(60) NULL,
            center_code VARCHAR(20) NOT NULL,
            center_name VARCHAR(60) NULL,
            center_location VARCHAR(100) NULL,
            job_start_time DATETIME NOT NULL,
            job_compleate_date DATE NULL,
            job_compleate_time TIME NULL,
            tl_id VARCHAR(20) NULL,
            tl_last_update DATETIME NULL,
            tl_remarks TEXT NULL,
            admin_id VARCHAR(20) NULL,
            admin_remarks TEXT NULL,
            admin_last_update_time DATETIME NULL,
            job_status VARCHAR(20) NOT NULL,
            delete_flag TINYINT NOT NULL DEFAULT 0,
            wheel_alignment INT UNSIGNED NOT NULL DEFAULT 0,
            wheel_balancing INT UNSIGNED NOT NULL DEFAULT 0,
            tyre_fitting INT UNSIGNED NOT NULL DEFAULT 0,
            puncture_repair INT UNSIGNED NOT NULL DEFAULT 0,
            tpms INT UNSIGNED NOT NULL DEFAULT 0,
            disc_drum_cutting INT UNSIGNED NOT NULL DEFAULT 0,
            brake_testing INT UNSIGNED NOT NULL DEFAULT 0,
            carbon_cleaning INT UNSIGNED NOT NULL DEFAULT 0,
            washing_cleaning INT UNSIGNED NOT NULL DEFAULT 0,
            interior_cleaning INT UNSIGNED NOT NULL DEFAULT 0,
            exterior_polishing INT UNSIGNED NOT NULL DEFAULT 0,
            paint_protection_film INT UNSIGNED NOT NULL DEFAULT 0,
            open_jobcard_key VARCHAR(80) GENERATED ALWAYS AS (
                IF(job_status = 'In Progress' AND delete_flag = 0,
                   CONCAT(center_code, '/', jobcard_no), NULL)
            ) STORED,
            PRIMARY KEY (id),
            UNIQUE KEY uq_open_jobcard (open_jobcard_key),
            KEY idx_center_status (center_code, job_status)
        )
    ";
}
